pub struct DefaultsConfig {
    pub width: usize,
    pub height: usize,
    pub depth: usize,
    pub topology: String,
    pub flipping_algorithm: String,
    pub site_selection: String,
    pub randomize: bool,
    pub burn_in: u64,
    pub steps: u64,
    pub record_frequency: u64,
    pub sweep_parameter: String,
    pub sweep_start: f64,
    pub sweep_stop: f64,
    pub sweep_points: usize,
    /// Zero lets the thread pool size itself.
    pub sweep_slots: usize,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            width: 11,
            height: 10,
            depth: 10,
            topology: "linear".to_string(),
            flipping_algorithm: "continuous".to_string(),
            site_selection: "random".to_string(),
            randomize: false,
            burn_in: 100_000,
            steps: 1_000_000,
            record_frequency: 1_000,
            sweep_parameter: "kT".to_string(),
            sweep_start: 0.1,
            sweep_stop: 2.0,
            sweep_points: 20,
            sweep_slots: 0,
        }
    }
}
