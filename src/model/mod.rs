mod browser;
mod table;

pub use browser::*;
pub use table::*;
