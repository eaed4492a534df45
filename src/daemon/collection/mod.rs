pub mod afk;
pub mod collector;
