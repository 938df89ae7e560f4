use crate::core::units::{COLD_WATER_TEMPERATURE, HOT_WATER_TEMPERATURE};

/// Calculate the fraction of hot water required when mixing hot and cold
/// water to achieve a target temperature
///
/// Arguments:
/// * `temp_target` -- temperature to be achieved, in any units
/// * `temp_hot`    -- temperature of hot water to be mixed, in same units as temp_target
/// * `temp_cold`   -- temperature of cold water to be mixed, in same units as temp_target
pub fn frac_hot_water(temp_target: f64, temp_hot: f64, temp_cold: f64) -> f64 {
    (temp_target - temp_cold) / (temp_hot - temp_cold)
}

/// Share of a flow at `temperature` that has to come from the hot water supply.
/// Water colder than the mains or hotter than the supply is taken as all cold or all hot.
pub fn hot_water_fraction(temperature: f64) -> f64 {
    frac_hot_water(temperature, HOT_WATER_TEMPERATURE, COLD_WATER_TEMPERATURE).clamp(0., 1.)
}

pub fn hot_water_equivalent(intensity: f64, temperature: f64) -> f64 {
    intensity * hot_water_fraction(temperature)
}
