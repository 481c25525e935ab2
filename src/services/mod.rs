pub mod email;
pub mod telegram;
