#![doc = include_str!(concat!("../", env!("CARGO_PKG_README")))]

#[doc(inline)]
pub use camcad_lie as lie;

#[doc(inline)]
pub use camcad_3d as k3d;

#[doc(inline)]
pub use camcad_optim as optim;

#[doc(inline)]
pub use camcad_registration as registration;
