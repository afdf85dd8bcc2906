pub mod events;
pub mod resolver;
