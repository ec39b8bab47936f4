//! CSI MasterFormat division codes.

/// Bucket for packages without a recognizable division.
pub const UNCLASSIFIED: &str = "unclassified";

/// Normalize a free-text division to a two-digit code.
///
/// The first run of digits decides: `"9"`, `"09 21 16"`, `"092116"` and
/// `"Division 9 - Finishes"` all become `"09"`. Codes above 49 are rejected.
pub fn normalize_division(raw: &str) -> Option<String> {
    let digits: String = raw
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    if digits.is_empty() {
        return None;
    }
    let lead = if digits.len() > 2 { &digits[..2] } else { &digits[..] };
    let value: u32 = lead.parse().ok()?;
    (value <= 49).then(|| format!("{:02}", value))
}

/// Bucket key for a package's division field.
pub fn division_key(raw: Option<&str>) -> String {
    raw.and_then(normalize_division)
        .unwrap_or_else(|| UNCLASSIFIED.to_string())
}

/// MasterFormat title of a two-digit division code.
pub fn division_title(code: &str) -> Option<&'static str> {
    let title = match code {
        "00" => "Procurement and Contracting Requirements",
        "01" => "General Requirements",
        "02" => "Existing Conditions",
        "03" => "Concrete",
        "04" => "Masonry",
        "05" => "Metals",
        "06" => "Wood, Plastics, and Composites",
        "07" => "Thermal and Moisture Protection",
        "08" => "Openings",
        "09" => "Finishes",
        "10" => "Specialties",
        "11" => "Equipment",
        "12" => "Furnishings",
        "13" => "Special Construction",
        "14" => "Conveying Equipment",
        "21" => "Fire Suppression",
        "22" => "Plumbing",
        "23" => "Heating, Ventilating, and Air Conditioning",
        "25" => "Integrated Automation",
        "26" => "Electrical",
        "27" => "Communications",
        "28" => "Electronic Safety and Security",
        "31" => "Earthwork",
        "32" => "Exterior Improvements",
        "33" => "Utilities",
        "34" => "Transportation",
        "35" => "Waterway and Marine Construction",
        "40" => "Process Interconnections",
        "41" => "Material Processing and Handling Equipment",
        "42" => "Process Heating, Cooling, and Drying Equipment",
        "43" => "Process Gas and Liquid Handling, Purification, and Storage Equipment",
        "44" => "Pollution and Waste Control Equipment",
        "45" => "Industry-Specific Manufacturing Equipment",
        "46" => "Water and Wastewater Equipment",
        "48" => "Electrical Power Generation",
        _ => return None,
    };
    Some(title)
}

/// Display title for a bucket key.
pub fn bucket_title(key: &str) -> String {
    if key == UNCLASSIFIED {
        return "Unclassified".to_string();
    }
    division_title(key)
        .map(str::to_string)
        .unwrap_or_else(|| format!("Division {}", key))
}
