// src/route/mod.rs

pub mod speed_limit;

pub use speed_limit::{EdgeLookup, LookaheadResult, RouteState, SpeedLimitLookahead};
