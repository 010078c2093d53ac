// Run pipeline: bounded customer fetch, then catalog resolution and fan counts.

pub mod fetch;
pub mod run;
