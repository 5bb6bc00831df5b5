pub mod evaluate;
pub mod rank;
