// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Record formatting.
//!
//! Pure functions: a record goes in, one fixed-width line comes out. Absent
//! fields and unknown codes render as [`PLACEHOLDER`].

use crate::protocol::{ClientRecord, ServerRecord};
use std::fmt::Display;
use std::time::{SystemTime, UNIX_EPOCH};

/// Rendered in place of a missing field or an unknown code.
pub const PLACEHOLDER: &str = "?";

/// Code to label tables. Each table is indexed by the numeric code.
#[derive(Debug, Clone, Copy)]
pub struct CodeTables {
    pub instruments: &'static [&'static str],
    pub skills: &'static [&'static str],
    pub countries: &'static [&'static str],
    pub operating_systems: &'static [&'static str],
}

static STANDARD: CodeTables = CodeTables {
    instruments: &INSTRUMENTS,
    skills: &SKILLS,
    countries: &COUNTRIES,
    operating_systems: &OPERATING_SYSTEMS,
};

impl CodeTables {
    /// The Jamulus tables.
    pub fn standard() -> &'static CodeTables {
        &STANDARD
    }

    pub fn instrument(&self, code: Option<u32>) -> &'static str {
        lookup(self.instruments, code)
    }

    pub fn skill(&self, code: Option<u32>) -> &'static str {
        lookup(self.skills, code)
    }

    pub fn country(&self, code: Option<u32>) -> &'static str {
        lookup(self.countries, code)
    }

    pub fn operating_system(&self, code: Option<u32>) -> &'static str {
        lookup(self.operating_systems, code)
    }
}

fn lookup(table: &'static [&'static str], code: Option<u32>) -> &'static str {
    code.and_then(|c| table.get(c as usize))
        .copied()
        .unwrap_or(PLACEHOLDER)
}

fn or_placeholder<T: Display>(value: Option<T>) -> String {
    value
        .map(|v| v.to_string())
        .unwrap_or_else(|| PLACEHOLDER.to_string())
}

/// One line per connected client.
pub fn format_client(client: &ClientRecord, tables: &CodeTables) -> String {
    format!(
        "{:>3} {:<20} {:<20} {:<12} {:<20} {:<20}",
        or_placeholder(client.id),
        or_placeholder(client.name.as_deref()),
        tables.instrument(client.instrument),
        tables.skill(client.skill),
        or_placeholder(client.city.as_deref()),
        tables.country(client.country),
    )
}

/// One line per registered server. `now` is the reference for the age column.
pub fn format_server(server: &ServerRecord, tables: &CodeTables, now: SystemTime) -> String {
    format!(
        "{:>15}:{:<5} {} {:<20} {:>3}/{:<3} {}/{} ({}/{}) {}s {}",
        server.ip.as_deref().unwrap_or("0"),
        server.port.unwrap_or(0),
        if server.permanent == Some(1) { "*" } else { " " },
        or_placeholder(server.name.as_deref()),
        or_placeholder(server.clients),
        or_placeholder(server.max_clients),
        or_placeholder(server.city.as_deref()),
        tables.country(server.country_id),
        tables.operating_system(server.os),
        or_placeholder(server.version.as_deref()),
        format_age(server.time_updated, now),
        server.internal_address.as_deref().unwrap_or(""),
    )
}

/// Whole seconds since `time_updated`; never negative.
fn format_age(time_updated: Option<f64>, now: SystemTime) -> String {
    let Some(updated) = time_updated else {
        return PLACEHOLDER.to_string();
    };
    let now = now
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0);
    // `as` saturates: NaN and negative ages become 0.
    ((now - updated) as u64).to_string()
}

/// Batch header, e.g. `received 3 clients`.
pub fn format_summary(count: usize, noun: &str) -> String {
    format!("received {} {}", count, noun)
}

static SKILLS: [&str; 4] = ["None", "Beginner", "Intermediate", "Expert"];

static OPERATING_SYSTEMS: [&str; 6] = ["Windows", "MacOS", "Linux", "Android", "iOS", "Unix"];

static INSTRUMENTS: [&str; 50] = [
    "None",
    "Drum Set",
    "Djembe",
    "Electric Guitar",
    "Acoustic Guitar",
    "Bass Guitar",
    "Keyboard",
    "Synthesizer",
    "Grand Piano",
    "Accordion",
    // 10
    "Vocal",
    "Microphone",
    "Harmonica",
    "Trumpet",
    "Trombone",
    "French Horn",
    "Tuba",
    "Saxophone",
    "Clarinet",
    "Flute",
    // 20
    "Violin",
    "Cello",
    "Double Bass",
    "Recorder",
    "Streamer",
    "Listener",
    "Guitar+Vocal",
    "Keyboard+Vocal",
    "Bodhran",
    "Bassoon",
    // 30
    "Oboe",
    "Harp",
    "Viola",
    "Congas",
    "Bongo",
    "Vocal Bass",
    "Vocal Tenor",
    "Vocal Alto",
    "Vocal Soprano",
    "Banjo",
    // 40
    "Mandolin",
    "Ukulele",
    "Bass Ukulele",
    "Vocal Baritone",
    "Vocal Lead",
    "Mountain Dulcimer",
    "Scratching",
    "Rapping",
    "Vibraphone",
    "Conductor",
];

// Qt5 QLocale::Country numbering.
static COUNTRIES: [&str; 262] = [
    "Any Country",
    "Afghanistan",
    "Albania",
    "Algeria",
    "American Samoa",
    "Andorra",
    "Angola",
    "Anguilla",
    "Antarctica",
    "Antigua And Barbuda",
    // 10
    "Argentina",
    "Armenia",
    "Aruba",
    "Australia",
    "Austria",
    "Azerbaijan",
    "Bahamas",
    "Bahrain",
    "Bangladesh",
    "Barbados",
    // 20
    "Belarus",
    "Belgium",
    "Belize",
    "Benin",
    "Bermuda",
    "Bhutan",
    "Bolivia",
    "Bosnia And Herzegowina",
    "Botswana",
    "Bouvet Island",
    // 30
    "Brazil",
    "British Indian Ocean Territory",
    "Brunei",
    "Bulgaria",
    "Burkina Faso",
    "Burundi",
    "Cambodia",
    "Cameroon",
    "Canada",
    "Cape Verde",
    // 40
    "Cayman Islands",
    "Central African Republic",
    "Chad",
    "Chile",
    "China",
    "Christmas Island",
    "Cocos Islands",
    "Colombia",
    "Comoros",
    "Congo - Kinshasa",
    // 50
    "Congo - Brazzaville",
    "Cook Islands",
    "Costa Rica",
    "Ivory Coast",
    "Croatia",
    "Cuba",
    "Cyprus",
    "Czech Republic",
    "Denmark",
    "Djibouti",
    // 60
    "Dominica",
    "Dominican Republic",
    "East Timor",
    "Ecuador",
    "Egypt",
    "El Salvador",
    "Equatorial Guinea",
    "Eritrea",
    "Estonia",
    "Ethiopia",
    // 70
    "Falkland Islands",
    "Faroe Islands",
    "Fiji",
    "Finland",
    "France",
    "Guernsey",
    "French Guiana",
    "French Polynesia",
    "French Southern Territories",
    "Gabon",
    // 80
    "Gambia",
    "Georgia",
    "Germany",
    "Ghana",
    "Gibraltar",
    "Greece",
    "Greenland",
    "Grenada",
    "Guadeloupe",
    "Guam",
    // 90
    "Guatemala",
    "Guinea",
    "Guinea Bissau",
    "Guyana",
    "Haiti",
    "Heard And McDonald Islands",
    "Honduras",
    "Hong Kong",
    "Hungary",
    "Iceland",
    // 100
    "India",
    "Indonesia",
    "Iran",
    "Iraq",
    "Ireland",
    "Israel",
    "Italy",
    "Jamaica",
    "Japan",
    "Jordan",
    // 110
    "Kazakhstan",
    "Kenya",
    "Kiribati",
    "North Korea",
    "South Korea",
    "Kuwait",
    "Kyrgyzstan",
    "Laos",
    "Latvia",
    "Lebanon",
    // 120
    "Lesotho",
    "Liberia",
    "Libya",
    "Liechtenstein",
    "Lithuania",
    "Luxembourg",
    "Macau",
    "Macedonia",
    "Madagascar",
    "Malawi",
    // 130
    "Malaysia",
    "Maldives",
    "Mali",
    "Malta",
    "Marshall Islands",
    "Martinique",
    "Mauritania",
    "Mauritius",
    "Mayotte",
    "Mexico",
    // 140
    "Micronesia",
    "Moldova",
    "Monaco",
    "Mongolia",
    "Montserrat",
    "Morocco",
    "Mozambique",
    "Myanmar",
    "Namibia",
    "Nauru",
    // 150
    "Nepal",
    "Netherlands",
    "Curacao",
    "New Caledonia",
    "New Zealand",
    "Nicaragua",
    "Niger",
    "Nigeria",
    "Niue",
    "Norfolk Island",
    // 160
    "Northern Mariana Islands",
    "Norway",
    "Oman",
    "Pakistan",
    "Palau",
    "Palestinian Territories",
    "Panama",
    "Papua New Guinea",
    "Paraguay",
    "Peru",
    // 170
    "Philippines",
    "Pitcairn",
    "Poland",
    "Portugal",
    "Puerto Rico",
    "Qatar",
    "Reunion",
    "Romania",
    "Russia",
    "Rwanda",
    // 180
    "Saint Kitts And Nevis",
    "Saint Lucia",
    "Saint Vincent And The Grenadines",
    "Samoa",
    "San Marino",
    "Sao Tome And Principe",
    "Saudi Arabia",
    "Senegal",
    "Seychelles",
    "Sierra Leone",
    // 190
    "Singapore",
    "Slovakia",
    "Slovenia",
    "Solomon Islands",
    "Somalia",
    "South Africa",
    "South Georgia And The South Sandwich Islands",
    "Spain",
    "Sri Lanka",
    "Saint Helena",
    // 200
    "Saint Pierre And Miquelon",
    "Sudan",
    "Suriname",
    "Svalbard And Jan Mayen Islands",
    "Swaziland",
    "Sweden",
    "Switzerland",
    "Syria",
    "Taiwan",
    "Tajikistan",
    // 210
    "Tanzania",
    "Thailand",
    "Togo",
    "Tokelau",
    "Tonga",
    "Trinidad And Tobago",
    "Tunisia",
    "Turkey",
    "Turkmenistan",
    "Turks And Caicos Islands",
    // 220
    "Tuvalu",
    "Uganda",
    "Ukraine",
    "United Arab Emirates",
    "United Kingdom",
    "United States",
    "United States Minor Outlying Islands",
    "Uruguay",
    "Uzbekistan",
    "Vanuatu",
    // 230
    "Vatican City State",
    "Venezuela",
    "Vietnam",
    "British Virgin Islands",
    "United States Virgin Islands",
    "Wallis And Futuna Islands",
    "Western Sahara",
    "Yemen",
    "Canary Islands",
    "Zambia",
    // 240
    "Zimbabwe",
    "Clipperton Island",
    "Montenegro",
    "Serbia",
    "Saint Barthelemy",
    "Saint Martin",
    "Latin America",
    "Ascension Island",
    "Aland Islands",
    "Diego Garcia",
    // 250
    "Ceuta And Melilla",
    "Isle Of Man",
    "Jersey",
    "Tristan Da Cunha",
    "South Sudan",
    "Bonaire",
    "Sint Maarten",
    "Kosovo",
    "European Union",
    "Outlying Oceania",
    // 260
    "World",
    "Europe",
];

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn at(secs: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(secs)
    }

    #[test]
    fn test_table_lookups() {
        let tables = CodeTables::standard();
        assert_eq!(tables.instrument(Some(1)), "Drum Set");
        assert_eq!(tables.instrument(Some(49)), "Conductor");
        assert_eq!(tables.skill(Some(3)), "Expert");
        assert_eq!(tables.country(Some(82)), "Germany");
        assert_eq!(tables.country(Some(206)), "Switzerland");
        assert_eq!(tables.country(Some(225)), "United States");
        assert_eq!(tables.operating_system(Some(2)), "Linux");
    }

    #[test]
    fn test_unknown_codes_render_placeholder() {
        let tables = CodeTables::standard();
        assert_eq!(tables.instrument(Some(500)), PLACEHOLDER);
        assert_eq!(tables.skill(None), PLACEHOLDER);
        assert_eq!(tables.country(Some(262)), PLACEHOLDER);
        assert_eq!(tables.operating_system(Some(6)), PLACEHOLDER);
    }

    #[test]
    fn test_custom_tables() {
        static OS: [&str; 1] = ["Plan 9"];
        let tables = CodeTables {
            operating_systems: &OS,
            ..*CodeTables::standard()
        };
        assert_eq!(tables.operating_system(Some(0)), "Plan 9");
        assert_eq!(tables.operating_system(Some(1)), PLACEHOLDER);
    }

    #[test]
    fn test_format_full_client() {
        let client = ClientRecord {
            id: Some(7),
            name: Some("alice".into()),
            instrument: Some(3),
            skill: Some(2),
            city: Some("Bern".into()),
            country: Some(206),
        };
        let line = format_client(&client, CodeTables::standard());
        assert_eq!(
            line,
            format!(
                "{:>3} {:<20} {:<20} {:<12} {:<20} {:<20}",
                "7", "alice", "Electric Guitar", "Intermediate", "Bern", "Switzerland"
            )
        );
    }

    #[test]
    fn test_format_empty_client() {
        let line = format_client(&ClientRecord::default(), CodeTables::standard());
        let fields: Vec<&str> = line.split_whitespace().collect();
        assert_eq!(fields, vec!["?"; 6]);
    }

    #[test]
    fn test_format_server() {
        let server = ServerRecord {
            ip: Some("10.0.0.1".into()),
            port: Some(22124),
            permanent: Some(1),
            name: Some("Jam".into()),
            clients: Some(3),
            max_clients: Some(10),
            city: Some("Oslo".into()),
            country_id: Some(161),
            os: Some(2),
            version: Some("3.9.1".into()),
            time_updated: Some(940.0),
            internal_address: Some("192.168.0.2:22124".into()),
        };
        let line = format_server(&server, CodeTables::standard(), at(1000));
        assert_eq!(
            line,
            format!(
                "{:>15}:{:<5} * {:<20} {:>3}/{:<3} Oslo/Norway (Linux/3.9.1) 60s 192.168.0.2:22124",
                "10.0.0.1", 22124, "Jam", 3, 10
            )
        );
    }

    #[test]
    fn test_format_server_missing_fields() {
        let line = format_server(&ServerRecord::default(), CodeTables::standard(), at(1000));
        assert!(line.starts_with(&format!("{:>15}:{:<5}  ", "0", 0)));
        assert!(line.contains("?/? (?/?) ?s"));
    }

    #[test]
    fn test_age_placeholder_when_timestamp_absent() {
        assert_eq!(format_age(None, at(1000)), "?");
    }

    #[test]
    fn test_age_truncates_and_never_negative() {
        assert_eq!(format_age(Some(997.4), at(1000)), "2");
        assert_eq!(format_age(Some(5000.0), at(1000)), "0");
        assert_eq!(format_age(Some(f64::NAN), at(1000)), "0");
    }

    #[test]
    fn test_summary() {
        assert_eq!(format_summary(3, "clients"), "received 3 clients");
    }
}
