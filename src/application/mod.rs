pub mod cli;
pub mod serve;
