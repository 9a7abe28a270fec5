pub mod broadcast;
pub mod commands;
