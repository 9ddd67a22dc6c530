pub mod args;
pub mod op;
pub mod ops;

pub use ops::{Activity, Export, Import, Init, Keygen, Peers, Pending, Pull, Push, Status};
