use tokio::time::Instant;

pub fn get_instant() -> Instant {
    Instant::now()
}

pub fn elapsed_secs(start: Instant) -> f64 {
    start.elapsed().as_secs_f64()
}
