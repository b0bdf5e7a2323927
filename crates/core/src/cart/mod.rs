pub mod aggregate;
pub mod proration;
pub mod resolver;
