pub mod apply;
pub mod delete;
pub mod import;
pub mod read;
pub mod sweep;
