pub mod clock;
pub mod customer;
pub mod error;
pub mod geofence;
pub mod phone;
pub mod token;

pub use clock::{Clock, ManualClock, SystemClock};
pub use customer::{AccrualResult, Customer, CustomerSnapshot};
pub use error::{Error, ErrorKind, Result};
pub use geofence::{Coordinates, GeoFence, EARTH_RADIUS_METERS};
pub use phone::PhoneNumber;
pub use token::{AccessToken, TokenStatus};
