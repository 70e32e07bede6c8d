//! Tracy profiler integration.
//!
//! With the `tracy` feature the per-frame tick marks a frame and plots
//! scratch usage; without it these calls compile to nothing.

#[cfg(feature = "tracy")]
pub use tracy_client;

/// Usage figures plotted once per tick.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct TickPlot {
    pub live_arenas: usize,
    pub frame_peak: usize,
    pub open_scopes: usize,
}

#[cfg(feature = "tracy")]
pub(crate) fn plot_tick(plot: TickPlot) {
    if let Some(client) = tracy_client::Client::running() {
        client.plot(tracy_client::plot_name!("scratch arenas"), plot.live_arenas as f64);
        client.plot(tracy_client::plot_name!("scratch frame peak"), plot.frame_peak as f64);
        client.plot(tracy_client::plot_name!("scratch open scopes"), plot.open_scopes as f64);
    }
}

#[cfg(not(feature = "tracy"))]
#[inline(always)]
pub(crate) fn plot_tick(plot: TickPlot) {
    let _ = plot;
}
