/// Number of decimal digits implied by an exchange tick size.
///
/// Ticks come back from exchange metadata as values like `0.01` or `0.00001`;
/// the shortest display form of the float is what decides the digit count.
pub fn decimal_places(tick: f64) -> u32 {
    let text = format!("{}", tick);
    match text.split_once('.') {
        Some((_, frac)) => frac.len() as u32,
        None => 0,
    }
}

/// Round half away from zero to a fixed number of decimal places.
pub fn round_to(value: f64, places: u32) -> f64 {
    let factor = 10f64.powi(places as i32);
    (value * factor).round() / factor
}
