mod completion_client;
mod compute_runs;
