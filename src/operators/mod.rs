//! The operator library.
//!
//! Every operator is a method returning a new [`Observable`](crate::Observable);
//! none of them mutate or subscribe to their source until the result is
//! subscribed.

mod combine;
mod filter;
mod flatten;
mod recover;
mod timing;
mod transform;
mod window;

pub use combine::{
    combine_latest, combine_latest2, combine_latest_with, concat, merge, race, zip, zip2, zip3,
    zip_with,
};
