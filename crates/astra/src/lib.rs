pub mod agent;
pub mod astra;
pub mod errors;
pub mod models;
pub mod prompt_template;
pub mod providers;
pub mod sandbox;
pub mod settings;
pub mod token_counter;
pub mod toolkit;
pub mod truncation;
