pub mod errors;
pub mod outcome;
pub mod params;
pub mod trial;

pub use errors::*;
pub use outcome::*;
pub use params::*;
pub use trial::*;
