use crate::tags::value_key;

/// Minutes assumed for open-ended buckets such as "60+ min".
const OPEN_ENDED_PADDING_MINUTES: u32 = 30;

/// Upper bound in minutes for a PrepTime bucket value.
///
/// Named buckets are matched first; otherwise the largest number in the value is used,
/// padded when the bucket is open-ended ("over 60", "60+").
pub fn bucket_minutes(raw: &str) -> Option<u32> {
    let key = value_key(raw);
    let named = match key.as_str() {
        "quick" | "express" | "very_quick" => Some(15),
        "fast" | "weeknight" => Some(30),
        "moderate" | "standard" => Some(45),
        "slow" | "project" | "weekend" | "long" => Some(120),
        _ => None,
    };
    if named.is_some() {
        return named;
    }

    let largest = numbers_in(&key).max()?;
    let open_ended = key.contains('+')
        || key.starts_with("over")
        || key.contains("more_than")
        || key.contains("plus");
    if open_ended {
        Some(largest.saturating_add(OPEN_ENDED_PADDING_MINUTES))
    } else {
        Some(largest)
    }
}

fn numbers_in(key: &str) -> impl Iterator<Item = u32> + '_ {
    key.split(|c: char| !c.is_ascii_digit())
        .filter(|part| !part.is_empty())
        .filter_map(|part| part.parse::<u32>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn named_buckets() {
        assert_eq!(bucket_minutes("Quick"), Some(15));
        assert_eq!(bucket_minutes("weekend"), Some(120));
        assert_eq!(bucket_minutes("slow"), Some(120));
    }

    #[test]
    fn numeric_ranges_use_upper_bound() {
        assert_eq!(bucket_minutes("Under 15 min"), Some(15));
        assert_eq!(bucket_minutes("15-30 min"), Some(30));
        assert_eq!(bucket_minutes("30_45"), Some(45));
    }

    #[test]
    fn open_ended_buckets_are_padded() {
        assert_eq!(bucket_minutes("60+ min"), Some(90));
        assert_eq!(bucket_minutes("Over 60 minutes"), Some(90));
    }

    #[test]
    fn unknown_buckets_are_none() {
        assert_eq!(bucket_minutes("whenever"), None);
    }
}
