use serde::{Deserialize, Serialize};

/// Thread group size shared by the emit and simulate shaders. This needs to
/// match the workgroup_size attribute in the compute shaders.
pub const COMPUTE_THREAD_GROUP_SIZE: u32 = 128;

/// Number of thread groups needed to cover `count` invocations.
pub fn dispatch_size(count: u32) -> u32 {
    (count + COMPUTE_THREAD_GROUP_SIZE - 1) / COMPUTE_THREAD_GROUP_SIZE
}

/// A config that parsed but cannot drive the simulation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config did not parse: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("{field} must be {constraint} (got {value})")]
    InvalidValue {
        field: &'static str,
        constraint: &'static str,
        value: f64,
    },
}

// Parameters that define the simulation. These don't change at runtime.
#[derive(Debug, Serialize, Deserialize, Clone, Copy)]
pub struct SimParams {
    pub max_particle_count: u32,
    pub emit_count_per_frame: u32,
    pub particle_lifetime: f32,
    /// Frames in flight; sizes the staged snapshot ring.
    pub buffer_count: u32,

    pub fps: f64,
    pub vsync: bool,
    pub use_indirect_draw: bool,

    #[serde(default)]
    pub emit_ranges: EmitRanges,

    #[serde(default)]
    pub particle_scale: ScaleRange,
}

/// Min/max boxes newly emitted particles sample their initial state from.
#[derive(Debug, Serialize, Deserialize, Clone, Copy)]
pub struct EmitRanges {
    pub position_min: [f32; 3],
    pub position_max: [f32; 3],
    pub velocity_min: [f32; 3],
    pub velocity_max: [f32; 3],
    pub acceleration_min: [f32; 3],
    pub acceleration_max: [f32; 3],
}

impl Default for EmitRanges {
    fn default() -> Self {
        EmitRanges {
            position_min: [-10.0, 0.0, 0.0],
            position_max: [10.0, 10.0, 20.0],
            velocity_min: [-1.0, -1.0, -1.0],
            velocity_max: [1.0, 1.0, 1.0],
            acceleration_min: [0.0, 0.0, 0.0],
            acceleration_max: [0.0, 0.0, 0.0],
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy)]
pub struct ScaleRange {
    pub start: f32,
    pub end: f32,
}

impl Default for ScaleRange {
    fn default() -> Self {
        ScaleRange {
            start: 0.3,
            end: 0.0,
        }
    }
}

impl SimParams {
    /// Rejects values the frame loop and shaders cannot handle: a zero
    /// buffer count divides by zero when picking a ring slot, a zero or
    /// non-finite lifetime turns the scale lerp into NaN, and a zero fps
    /// makes the target frame duration unconstructible.
    pub fn validate(&self) -> Result<(), ConfigError> {
        fn invalid(
            field: &'static str,
            constraint: &'static str,
            value: f64,
        ) -> Result<(), ConfigError> {
            Err(ConfigError::InvalidValue {
                field,
                constraint,
                value,
            })
        }
        if self.max_particle_count < 1 {
            return invalid("max_particle_count", "at least 1", 0.0);
        }
        if self.buffer_count < 2 {
            return invalid("buffer_count", "at least 2", self.buffer_count as f64);
        }
        if !(self.particle_lifetime > 0.0) || !self.particle_lifetime.is_finite() {
            return invalid(
                "particle_lifetime",
                "positive and finite",
                self.particle_lifetime as f64,
            );
        }
        if !(self.fps > 0.0) || !self.fps.is_finite() {
            return invalid("fps", "positive and finite", self.fps);
        }
        Ok(())
    }
}

impl std::str::FromStr for SimParams {
    type Err = ConfigError;
    fn from_str(serialized: &str) -> Result<Self, Self::Err> {
        let params: SimParams = toml::from_str(serialized)?;
        params.validate()?;
        Ok(params)
    }
}

impl Default for SimParams {
    fn default() -> Self {
        SimParams {
            max_particle_count: 1000,
            emit_count_per_frame: 3,
            particle_lifetime: 5.0,
            buffer_count: 3,
            fps: 60.0,
            vsync: true,
            use_indirect_draw: false,
            emit_ranges: EmitRanges::default(),
            particle_scale: ScaleRange::default(),
        }
    }
}

pub fn get_params_from_default_file() -> SimParams {
    let config_data = include_str!("../demo_config.toml");
    match config_data.parse() {
        Ok(params) => params,
        Err(e) => {
            log::error!("Failed to parse embedded config: {:?}", e);
            SimParams::default()
        }
    }
}
