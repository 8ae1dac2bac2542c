pub mod bundle;
pub mod command;
pub mod locator;
pub mod parse;
pub mod runner;
