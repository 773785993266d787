//! Detection of WAF / anti-bot interstitial pages.

/// Known protection vendors and the markers their challenge pages carry.
/// Checked in order; the first vendor with a matching marker wins.
const SIGNATURES: &[(&str, &[&str])] = &[
    (
        "Cloudflare",
        &["Pardon Our Interruption", "challenge-platform", "cf_clearance"],
    ),
    (
        "Incapsula",
        &[
            "Incapsula",
            "incident_id",
            "_Incapsula_Resource",
            "distil_referrer",
        ],
    ),
    ("AWS WAF", &["AWS WAF", "akamai_validation"]),
    ("F5 BIG-IP", &["F5 BIG-IP", "BIG-IP"]),
];

/// Return the vendor whose signature appears in `html`, if any.
///
/// Matching is case-sensitive substring containment.
pub fn detect_protection(html: &str) -> Option<&'static str> {
    SIGNATURES
        .iter()
        .find(|(_, markers)| markers.iter().any(|m| html.contains(m)))
        .map(|(vendor, _)| *vendor)
}
