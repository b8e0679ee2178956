/*
[INPUT]:  Chart resolution strings ("1", "60", "1D", "W", ...)
[OUTPUT]: Binance kline interval names
[POS]:    Datafeed - resolution vocabulary shared by history and streaming bars
[UPDATE]: When adding supported resolutions
*/

/// Resolutions advertised to the chart in `on_ready`
pub const SUPPORTED_RESOLUTIONS: [&str; 15] = [
    "1", "3", "5", "15", "30", "60", "120", "240", "360", "480", "720", "1D", "3D", "1W", "1M",
];

/// Binance kline interval for a chart resolution.
///
/// Short forms `D`, `W` and `M` are accepted next to the advertised ones.
pub fn interval_for(resolution: &str) -> Option<&'static str> {
    let interval = match resolution {
        "1" => "1m",
        "3" => "3m",
        "5" => "5m",
        "15" => "15m",
        "30" => "30m",
        "60" => "1h",
        "120" => "2h",
        "240" => "4h",
        "360" => "6h",
        "480" => "8h",
        "720" => "12h",
        "D" | "1D" => "1d",
        "3D" => "3d",
        "W" | "1W" => "1w",
        "M" | "1M" => "1M",
        _ => return None,
    };
    Some(interval)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("1", "1m")]
    #[case("15", "15m")]
    #[case("60", "1h")]
    #[case("720", "12h")]
    #[case("D", "1d")]
    #[case("1D", "1d")]
    #[case("3D", "3d")]
    #[case("W", "1w")]
    #[case("1M", "1M")]
    fn maps_resolution_to_interval(#[case] resolution: &str, #[case] expected: &str) {
        assert_eq!(interval_for(resolution), Some(expected));
    }

    #[rstest]
    #[case("")]
    #[case("2")]
    #[case("1d")]
    #[case("1S")]
    fn rejects_unknown_resolutions(#[case] resolution: &str) {
        assert_eq!(interval_for(resolution), None);
    }

    #[test]
    fn every_advertised_resolution_has_an_interval() {
        for resolution in SUPPORTED_RESOLUTIONS {
            assert!(interval_for(resolution).is_some(), "{resolution}");
        }
    }
}
