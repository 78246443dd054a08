pub mod layout;
pub mod settings;
