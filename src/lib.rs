//! Builds the offline product bundle: filters the OpenFoodFacts dump down to
//! the target countries, then loads the result into the SQLite file the
//! front-end ships with.

pub mod config;
pub mod extract;
pub mod fetch;
pub mod load;
pub mod pipeline;
pub mod utils;
