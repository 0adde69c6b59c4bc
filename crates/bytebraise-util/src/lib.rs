pub mod env;
pub mod index_map;
pub mod path;
pub mod split;
