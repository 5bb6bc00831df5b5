mod pipeline;
mod run;
#[cfg(test)]
mod tests;

pub use self::run::run;
