//! Human-scaled throughput strings.

const MB_PER_GB: f64 = 1024.0;

/// Renders a MB/s figure as `"12.34 MB/s"`, or as GB/s once it reaches 1024 MB/s.
pub(crate) fn speed(mbps: f64) -> String {
    if mbps < MB_PER_GB {
        format!("{mbps:.2} MB/s")
    } else {
        format!("{:.2} GB/s", mbps / MB_PER_GB)
    }
}

#[cfg(test)]
mod test {
    use super::speed;

    #[test]
    fn below_a_gigabyte() {
        assert_eq!(speed(0.0), "0.00 MB/s");
        assert_eq!(speed(123.456), "123.46 MB/s");
        assert_eq!(speed(1023.99), "1023.99 MB/s");
    }

    #[test]
    fn gigabyte_and_up() {
        assert_eq!(speed(1024.0), "1.00 GB/s");
        assert_eq!(speed(3584.0), "3.50 GB/s");
    }

    #[test]
    fn unit_tracks_magnitude() {
        for step in 0..4000 {
            let mbps = step as f64 * 0.75;
            let shown = speed(mbps);
            let (number, unit) = shown.split_once(' ').expect("value and unit");
            let number: f64 = number.parse().expect("numeric part");
            if mbps < 1024.0 {
                assert_eq!(unit, "MB/s");
                assert!((number - mbps).abs() <= 0.006, "{shown} vs {mbps}");
            } else {
                assert_eq!(unit, "GB/s");
                assert!((number - mbps / 1024.0).abs() <= 0.006, "{shown} vs {mbps}");
            }
        }
    }
}
