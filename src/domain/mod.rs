mod account;
mod money;
mod operation;

pub use account::*;
pub use money::*;
pub use operation::*;
