pub mod payment;
pub mod response;
pub mod revenue;
pub mod wallet;

pub use payment::*;
pub use response::*;
pub use revenue::*;
pub use wallet::*;
