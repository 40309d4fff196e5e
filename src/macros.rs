/// Joins a label and its perf fields as `label=a;b;c`, dropping trailing empty fields.
macro_rules! perf_string {
    ($name:expr, $( $tps:expr), *) => {
        {
            let mut s = String::new();
            s.push_str(&format!("{}=", $name));
            $(
                s.push_str(&$tps.to_perf_string());
                s.push(';');
            )*
            s.trim_end_matches(';').to_string()
        }
    };
}

#[cfg(test)]
mod tests {
    use crate::ToPerfString;

    #[test]
    fn test_perf_string_macro() {
        let none: Option<f64> = None;
        assert_eq!(perf_string!("a", 1.0_f64, none, Some(3.0_f64)), "a=1;;3");
        assert_eq!(perf_string!("a", 1.5_f64, none, none), "a=1.5");
    }
}
