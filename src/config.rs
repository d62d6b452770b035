use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
}

/// School-level knobs for schedule lookup, attendance checks and passes.
#[derive(Debug, Clone, Deserialize)]
pub struct SchoolConfig {
    pub utc_offset_minutes: i32,
    pub campus_lat: f64,
    pub campus_lng: f64,
    pub geofence_radius_m: f64,
    pub mark_open_before_minutes: i64,
    pub late_after_minutes: i64,
    pub verification_timeout_ms: u64,
    pub pass_sweep_secs: u64,
    pub risk_threshold_percent: u32,
    pub role_switch_enabled: bool,
}

impl Default for SchoolConfig {
    fn default() -> Self {
        Self {
            utc_offset_minutes: 0,
            campus_lat: 40.7128,
            campus_lng: -74.0060,
            geofence_radius_m: 150.0,
            mark_open_before_minutes: 10,
            late_after_minutes: 10,
            verification_timeout_ms: 5_000,
            pass_sweep_secs: 30,
            risk_threshold_percent: 75,
            role_switch_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: Option<String>,
    pub jwt: JwtConfig,
    pub school: SchoolConfig,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")
            .ok()
            .filter(|v| !v.trim().is_empty());
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "schoolops".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "schoolops-users".into()),
            ttl_minutes: env_or("JWT_TTL_MINUTES", 60 * 12),
        };
        let d = SchoolConfig::default();
        let school = SchoolConfig {
            utc_offset_minutes: env_or("SCHOOL_UTC_OFFSET_MINUTES", d.utc_offset_minutes),
            campus_lat: env_or("CAMPUS_LAT", d.campus_lat),
            campus_lng: env_or("CAMPUS_LNG", d.campus_lng),
            geofence_radius_m: env_or("GEOFENCE_RADIUS_M", d.geofence_radius_m),
            mark_open_before_minutes: env_or("MARK_OPEN_BEFORE_MINUTES", d.mark_open_before_minutes),
            late_after_minutes: env_or("LATE_AFTER_MINUTES", d.late_after_minutes),
            verification_timeout_ms: env_or("VERIFICATION_TIMEOUT_MS", d.verification_timeout_ms),
            pass_sweep_secs: env_or("PASS_SWEEP_SECS", d.pass_sweep_secs),
            risk_threshold_percent: env_or("RISK_THRESHOLD_PERCENT", d.risk_threshold_percent),
            role_switch_enabled: env_or("ROLE_SWITCH_ENABLED", d.role_switch_enabled),
        };
        Ok(Self {
            database_url,
            jwt,
            school,
        })
    }
}
