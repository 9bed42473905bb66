// Integration tests


mod coalescing_test;
mod fallback_test;
