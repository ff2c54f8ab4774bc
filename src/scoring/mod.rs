pub mod aggregate;
pub mod financial;
pub mod internal;
