mod stats_reporter;

pub use stats_reporter::StatsReporter;
