pub mod commands;
pub mod hokku;
pub mod inline;
