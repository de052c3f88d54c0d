pub mod data;
pub mod util;
