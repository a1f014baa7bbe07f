pub mod lister;
pub mod size_cache;
pub mod transfer;
