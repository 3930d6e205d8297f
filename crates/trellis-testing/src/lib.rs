//! Testing utilities and harness for Trellis

pub mod testing;

pub use testing::*;

pub mod prelude {
    pub use crate::testing::*;
}
