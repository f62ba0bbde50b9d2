/// Loss beyond which a link is considered unusable when sizing coverage.
pub const MAX_PATH_LOSS_DB: f64 = 140.0;

const C_LIGHT: f64 = 299_792_458.0;

/// Clutter class recognised by the empirical formulas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Environment {
    #[default]
    Urban,
    UrbanLarge,
    Suburban,
    Rural,
    Open,
    Coastal,
}

impl Environment {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "urban" => Environment::Urban,
            "urban-large" => Environment::UrbanLarge,
            "suburban" => Environment::Suburban,
            "rural" => Environment::Rural,
            "open" => Environment::Open,
            "coastal" => Environment::Coastal,
            _ => Environment::Rural,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Environment::Urban => "urban",
            Environment::UrbanLarge => "urban-large",
            Environment::Suburban => "suburban",
            Environment::Rural => "rural",
            Environment::Open => "open",
            Environment::Coastal => "coastal",
        }
    }

    /// Share of the Tx-Rx span covered by buildings in the 3D scene.
    pub fn urban_ratio(&self) -> f64 {
        match self {
            Environment::Urban | Environment::UrbanLarge => 0.7,
            Environment::Suburban => 0.4,
            _ => 0.2,
        }
    }
}

/// Hata mobile antenna correction for small/medium cities.
fn mobile_height_correction(freq_mhz: f64, h_m: f64) -> f64 {
    (1.1 * freq_mhz.log10() - 0.7) * h_m - (1.56 * freq_mhz.log10() - 0.8)
}

fn cost231_environment_offset(env: Environment, freq_mhz: f64) -> f64 {
    let lf = freq_mhz.log10();
    match env {
        Environment::Urban | Environment::UrbanLarge => 3.0,
        Environment::Suburban => 0.0,
        _ => 4.78 * lf * lf - 18.33 * lf + 40.94,
    }
}

/// COST-231 Hata loss in dB. `dist_km` must be positive.
pub fn cost231_path_loss(freq_mhz: f64, h_b: f64, h_m: f64, dist_km: f64, env: Environment) -> f64 {
    let a_hm = mobile_height_correction(freq_mhz, h_m);
    46.3 + 33.9 * freq_mhz.log10() - 13.82 * h_b.log10() - a_hm
        + (44.9 - 6.55 * h_b.log10()) * dist_km.log10()
        + cost231_environment_offset(env, freq_mhz)
}

/// COST-231 Hata solved for the distance at which loss reaches `max_loss_db`, metres.
pub fn cost231_coverage_radius_m(freq_mhz: f64, h_b: f64, h_m: f64, env: Environment, max_loss_db: f64) -> f64 {
    let a_hm = mobile_height_correction(freq_mhz, h_m);
    let fixed = 46.3 + 33.9 * freq_mhz.log10() - 13.82 * h_b.log10() - a_hm
        + cost231_environment_offset(env, freq_mhz);
    let slope = 44.9 - 6.55 * h_b.log10();
    10f64.powf((max_loss_db - fixed) / slope) * 1000.0
}

/// Okumura-Hata loss in dB (frequency in MHz).
pub fn hata_path_loss(freq_mhz: f64, h_b: f64, h_m: f64, dist_km: f64, env: Environment, large_city: bool) -> f64 {
    let lf = freq_mhz.log10();
    let a_hm = if large_city && freq_mhz >= 400.0 {
        3.2 * (11.75 * h_m).log10().powi(2) - 4.97
    } else {
        mobile_height_correction(freq_mhz, h_m)
    };
    let urban = 69.55 + 26.16 * lf - 13.82 * h_b.log10() - a_hm + (44.9 - 6.55 * h_b.log10()) * dist_km.log10();
    match env {
        Environment::Suburban => urban - (2.0 * (freq_mhz / 28.0).log10().powi(2) + 5.4),
        Environment::Rural | Environment::Open => urban - (4.78 * lf * lf - 18.33 * lf + 40.94),
        _ => urban,
    }
}

/// Free-space path loss in dB.
pub fn fspl_db(dist_km: f64, freq_mhz: f64) -> f64 {
    let d_m = dist_km * 1000.0;
    let f_hz = freq_mhz * 1e6;
    20.0 * d_m.log10() + 20.0 * f_hz.log10() + 20.0 * (4.0 * std::f64::consts::PI / C_LIGHT).log10()
}

/// Two-ray ground reflection loss in dB, falling back to free space inside the
/// crossover distance.
pub fn two_ray_ground_db(dist_km: f64, freq_mhz: f64, h_t: f64, h_r: f64) -> f64 {
    let d_m = dist_km * 1000.0;
    let wavelength = C_LIGHT / (freq_mhz * 1e6);
    let crossover = 4.0 * std::f64::consts::PI * h_t * h_r / wavelength;
    if d_m < crossover {
        fspl_db(dist_km, freq_mhz)
    } else {
        40.0 * d_m.log10() - 20.0 * h_t.log10() - 20.0 * h_r.log10()
    }
}

/// Distance in metres where a monotonically increasing loss curve crosses
/// `max_loss_db`, searched between 10 m and 100 km. Returns 0 when even 10 m
/// is already too lossy and 100 km when the whole range is usable.
pub fn solve_coverage_radius_m<F: Fn(f64) -> f64>(loss_at_km: F, max_loss_db: f64) -> f64 {
    let (mut lo, mut hi) = (0.01f64.ln(), 100f64.ln());
    if loss_at_km(lo.exp()) >= max_loss_db {
        return 0.0;
    }
    if loss_at_km(hi.exp()) <= max_loss_db {
        return hi.exp() * 1000.0;
    }
    for _ in 0..60 {
        let mid = 0.5 * (lo + hi);
        if loss_at_km(mid.exp()) < max_loss_db {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    lo.exp() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cost231_reference_value() {
        // 1800 MHz, 50 m mast, 1.5 m handset, 1 km, suburban (C = 0)
        let l = cost231_path_loss(1800.0, 50.0, 1.5, 1.0, Environment::Suburban);
        assert!((l - 133.2).abs() < 0.2, "loss {}", l);
    }

    #[test]
    fn closed_form_radius_matches_bisection() {
        let env = Environment::Urban;
        let closed = cost231_coverage_radius_m(1800.0, 50.0, 1.5, env, 140.0);
        let solved = solve_coverage_radius_m(|d| cost231_path_loss(1800.0, 50.0, 1.5, d, env), 140.0);
        assert!((closed - solved).abs() / closed < 1e-6);
    }

    #[test]
    fn fspl_textbook_value() {
        // 1 km at 2400 MHz is ~100.05 dB
        assert!((fspl_db(1.0, 2400.0) - 100.05).abs() < 0.05);
    }

    #[test]
    fn environment_ratios() {
        assert_eq!(Environment::parse("urban").urban_ratio(), 0.7);
        assert_eq!(Environment::parse("Suburban").urban_ratio(), 0.4);
        assert_eq!(Environment::parse("coastal").urban_ratio(), 0.2);
        assert_eq!(Environment::parse("anything").urban_ratio(), 0.2);
    }
}
