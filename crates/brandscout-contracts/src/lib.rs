pub mod design;
pub mod events;
pub mod session;
