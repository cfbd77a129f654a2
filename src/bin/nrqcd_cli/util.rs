use chrono::Local;
use num_format::{CustomFormat, Grouping, ToFormattedString};

pub(super) fn grouped(n: usize) -> String {
    let fmt = CustomFormat::builder()
        .grouping(Grouping::Standard)
        .separator("_")
        .build()
        .unwrap();
    n.to_formatted_string(&fmt)
}

pub(super) fn local_time() -> String {
    Local::now().format("%Y-%m-%dT%H:%M:%S%.3f").to_string()
}

/// Parses `a,b,c,...` into exactly `K` integers.
pub(super) fn parse_list<T: std::str::FromStr, const K: usize>(s: &str) -> Result<[T; K], String> {
    let parts: Vec<T> = s
        .split(',')
        .map(|p| {
            p.trim()
                .parse::<T>()
                .map_err(|_| format!("'{}' is not a valid number", p))
        })
        .collect::<Result<_, _>>()?;
    let count = parts.len();
    parts
        .try_into()
        .map_err(|_| format!("expected {} comma-separated values, got {}", K, count))
}

pub(super) fn parse_coords(s: &str) -> Result<[usize; 4], String> {
    parse_list(s)
}

pub(super) fn parse_momentum(s: &str) -> Result<[i64; 3], String> {
    parse_list(s)
}

/// Parses `k=value` for coefficient `c_k`.
pub(super) fn parse_coefficient(s: &str) -> Result<(usize, f64), String> {
    let (k, v) = s
        .split_once('=')
        .ok_or_else(|| format!("expected k=value, got '{}'", s))?;
    let k = k
        .trim()
        .trim_start_matches('c')
        .parse::<usize>()
        .map_err(|_| format!("'{}' is not a coefficient index", k))?;
    if k >= nrqcd_evolve::NUM_TERMS {
        return Err(format!("coefficient c{} does not exist", k));
    }
    let v = v
        .trim()
        .parse::<f64>()
        .map_err(|_| format!("'{}' is not a number", v))?;
    Ok((k, v))
}
