//! Generic per-agent time series output.
//!
//! A convenience over the recorder for periodic metrics: each call appends
//! one `(agent, time, value)` row to a `TimeSeries<Name>` table. Facilities
//! use this for things like power produced or throughput consumed.

use crate::context::Context;
use mfs_core::models::AgentId;

/// Record one sample of the named series for an agent at the current time.
pub fn record_time_series(ctx: &mut Context, name: &str, agent: AgentId, value: f64) {
    let time = ctx.time();
    let _ = ctx
        .new_datum(format!("TimeSeries{name}"))
        .add_val("AgentId", agent.0 as i64)
        .add_val("Time", time)
        .add_val("Value", value)
        .record();
}
