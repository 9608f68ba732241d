use crate::lists::ListStore;
use crate::models::names_match;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use lettre::Address;
use once_cell::sync::Lazy;
use regex::Regex;
use std::str::FromStr;

// Hôte exigé pour qu'une adresse soit considérée comme une adresse DoD.
pub const REQUIRED_DOD_EMAIL_HOST: &str = "mail.mil";

// Opérateurs reconnus et leur passerelle e-mail -> SMS.
pub const PHONE_CARRIER_MAIL_DOMAINS: &[(&str, &str)] = &[
    ("Verizon", "vtext.com"),
    ("AT&T", "txt.att.net"),
    ("T-Mobile", "tmomail.net"),
    ("Sprint", "messaging.sprintpcs.com"),
    ("US Cellular", "email.uscc.net"),
    ("Virgin Mobile", "vmobl.com"),
];

// Numéros publicitaires historiquement publiés, donc invalides.
const ADVERTISED_SSNS: &[&str] = &["219099999", "078051120"];

static SSN_DASHED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{3})-(\d{2})-(\d{4})$").expect("valid SSN regex"));
static SSN_PLAIN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{3})(\d{2})(\d{4})$").expect("valid SSN regex"));

const DATE_TIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %I:%M:%S %p",
    "%m/%d/%Y %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%d %B %Y", "%B %d, %Y"];

// Entrée des prédicats "are_valid_*" : liste JSON encodée ou liste déjà découpée.
#[derive(Debug, Clone)]
pub enum StringList<'a> {
    Json(&'a str),
    Values(&'a [String]),
}

impl StringList<'_> {
    // `None` si le JSON n'est pas une liste de chaînes.
    fn values(&self) -> Option<Vec<String>> {
        match self {
            StringList::Json(raw) => serde_json::from_str(raw).ok(),
            StringList::Values(values) => Some(values.to_vec()),
        }
    }

    fn all(&self, pred: impl Fn(&str) -> bool) -> bool {
        self.values()
            .map(|values| values.iter().all(|v| pred(v.as_str())))
            .unwrap_or(false)
    }
}

pub fn is_valid_guid(value: &str) -> bool {
    uuid::Uuid::parse_str(value.trim()).is_ok()
}

pub fn is_valid_password(value: &str) -> bool {
    (6..=40).contains(&value.chars().count())
}

pub fn is_valid_email_address(value: &str) -> bool {
    Address::from_str(value.trim()).is_ok()
}

pub fn are_valid_email_addresses(values: &StringList<'_>) -> bool {
    values.all(is_valid_email_address)
}

pub fn is_valid_dod_email_address(value: &str) -> bool {
    Address::from_str(value.trim())
        .map(|address| address.domain().eq_ignore_ascii_case(REQUIRED_DOD_EMAIL_HOST))
        .unwrap_or(false)
}

pub fn is_valid_username(value: &str) -> bool {
    (6..=20).contains(&value.chars().count()) && value.chars().all(char::is_alphanumeric)
}

pub fn is_valid_latitude(value: f64) -> bool {
    (-90.0..=90.0).contains(&value)
}

pub fn is_valid_latitude_str(value: &str) -> bool {
    value
        .trim()
        .parse::<f64>()
        .map(is_valid_latitude)
        .unwrap_or(false)
}

pub fn is_valid_longitude(value: f64) -> bool {
    (-180.0..=180.0).contains(&value)
}

pub fn is_valid_longitude_str(value: &str) -> bool {
    value
        .trim()
        .parse::<f64>()
        .map(is_valid_longitude)
        .unwrap_or(false)
}

// 11 chiffres, le premier étant 1.
pub fn is_valid_phone_number(value: &str) -> bool {
    value.len() == 11 && value.starts_with('1') && value.chars().all(|c| c.is_ascii_digit())
}

pub fn are_valid_phone_numbers(values: &StringList<'_>) -> bool {
    values.all(is_valid_phone_number)
}

// URI absolue bien formée.
pub fn is_valid_website(value: &str) -> bool {
    !value.chars().any(char::is_whitespace) && url::Url::parse(value).is_ok()
}

pub fn is_valid_date_time(value: &str) -> bool {
    let value = value.trim();
    DateTime::parse_from_rfc3339(value).is_ok()
        || DATE_TIME_FORMATS
            .iter()
            .any(|fmt| NaiveDateTime::parse_from_str(value, fmt).is_ok())
        || DATE_FORMATS
            .iter()
            .any(|fmt| NaiveDate::parse_from_str(value, fmt).is_ok())
}

pub fn is_valid_boolean(value: &str) -> bool {
    parse_boolean(value).is_some()
}

// "true"/"false" sans tenir compte de la casse ni des espaces autour.
pub fn parse_boolean(value: &str) -> Option<bool> {
    let value = value.trim();
    if value.eq_ignore_ascii_case("true") {
        Some(true)
    } else if value.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

pub fn is_valid_name_property(value: &str) -> bool {
    !value.trim().is_empty() && value.chars().count() <= 50
}

// AAA-GG-SSSS ou AAAGGSSSS ; zone != 000, 666, 9xx ; groupe != 00 ; série != 0000.
pub fn is_valid_ssn(value: &str) -> bool {
    let Some(caps) = SSN_DASHED
        .captures(value)
        .or_else(|| SSN_PLAIN.captures(value))
    else {
        return false;
    };

    let (area, group, serial) = (&caps[1], &caps[2], &caps[3]);
    let digits = format!("{}{}{}", area, group, serial);

    !ADVERTISED_SSNS.contains(&digits.as_str())
        && area != "000"
        && area != "666"
        && !area.starts_with('9')
        && group != "00"
        && serial != "0000"
}

pub fn is_valid_phone_carrier(value: &str) -> bool {
    PHONE_CARRIER_MAIL_DOMAINS
        .iter()
        .any(|(carrier, _)| names_match(carrier, value))
}

// --- Appartenance à une liste de référence (via le cache des listes) ---

fn is_in_list(lists: &ListStore, list_name: &str, value: &str) -> bool {
    lists
        .get_list(list_name)
        .map(|list| list.contains_value(value))
        .unwrap_or(false)
}

pub fn is_valid_gender(lists: &ListStore, value: &str) -> bool {
    is_in_list(lists, "Genders", value)
}

pub fn is_valid_ethnicity(lists: &ListStore, value: &str) -> bool {
    is_in_list(lists, "Ethnicities", value)
}

pub fn is_valid_religious_preference(lists: &ListStore, value: &str) -> bool {
    is_in_list(lists, "ReligiousPreferences", value)
}

pub fn is_valid_suffix(lists: &ListStore, value: &str) -> bool {
    is_in_list(lists, "Suffixes", value)
}

pub fn is_valid_rank(lists: &ListStore, value: &str) -> bool {
    is_in_list(lists, "Ranks", value)
}

pub fn is_valid_rate(lists: &ListStore, value: &str) -> bool {
    is_in_list(lists, "Rates", value)
}

pub fn is_valid_duty_status(lists: &ListStore, value: &str) -> bool {
    is_in_list(lists, "DutyStatuses", value)
}

pub fn is_valid_muster_state(lists: &ListStore, value: &str) -> bool {
    is_in_list(lists, "MusterStates", value)
}

pub fn is_valid_uic(lists: &ListStore, value: &str) -> bool {
    is_in_list(lists, "UICs", value)
}

pub fn is_valid_phone_type(lists: &ListStore, value: &str) -> bool {
    is_in_list(lists, "PhoneTypes", value)
}

pub fn are_valid_necs(lists: &ListStore, values: &StringList<'_>) -> bool {
    match lists.get_list("NECs") {
        Some(necs) => values.all(|v| necs.contains_value(v)),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::init_database;
    use crate::models::ReferenceList;

    #[test]
    fn test_guid() {
        assert!(is_valid_guid("6f9619ff-8b86-d011-b42d-00cf4fc964ff"));
        assert!(is_valid_guid("{6F9619FF-8B86-D011-B42D-00CF4FC964FF}"));
        assert!(!is_valid_guid("6f9619ff-8b86"));
        assert!(!is_valid_guid(""));
    }

    #[test]
    fn test_password_and_username() {
        assert!(is_valid_password("secret"));
        assert!(!is_valid_password("short"));
        assert!(!is_valid_password(&"x".repeat(41)));

        assert!(is_valid_username("sailor01"));
        assert!(!is_valid_username("sail"));
        assert!(!is_valid_username("sailor_01"));
    }

    #[test]
    fn test_email_addresses() {
        assert!(is_valid_email_address("john.doe@example.com"));
        assert!(!is_valid_email_address("john.doe"));
        assert!(is_valid_dod_email_address("john.doe.mil@MAIL.MIL"));
        assert!(!is_valid_dod_email_address("john.doe@gmail.com"));

        assert!(are_valid_email_addresses(&StringList::Json(
            r#"["a@b.com", "c@d.org"]"#
        )));
        assert!(!are_valid_email_addresses(&StringList::Json(
            r#"["a@b.com", "nope"]"#
        )));
        assert!(!are_valid_email_addresses(&StringList::Json("not json")));
        let values = vec!["a@b.com".to_string()];
        assert!(are_valid_email_addresses(&StringList::Values(&values)));
    }

    #[test]
    fn test_coordinates() {
        assert!(is_valid_latitude_str("45.5"));
        assert!(is_valid_latitude(-90.0));
        assert!(!is_valid_latitude_str("90.1"));
        assert!(!is_valid_latitude_str("north"));
        assert!(is_valid_longitude_str("-180"));
        assert!(!is_valid_longitude(180.5));
    }

    #[test]
    fn test_phone_numbers() {
        assert!(is_valid_phone_number("17065551234"));
        assert!(!is_valid_phone_number("27065551234"));
        assert!(!is_valid_phone_number("1706555123"));
        assert!(!is_valid_phone_number("1706555123a"));
        assert!(are_valid_phone_numbers(&StringList::Json(
            r#"["17065551234", "18005550000"]"#
        )));
        assert!(!are_valid_phone_numbers(&StringList::Json(r#"["123"]"#)));
    }

    #[test]
    fn test_website_and_dates() {
        assert!(is_valid_website("https://www.navy.mil/"));
        assert!(!is_valid_website("www.navy.mil"));
        assert!(!is_valid_website("http://navy.mil/a b"));

        assert!(is_valid_date_time("2016-01-02T03:04:05Z"));
        assert!(is_valid_date_time("2016-01-02 03:04:05"));
        assert!(is_valid_date_time("01/02/2016"));
        assert!(!is_valid_date_time("yesterday"));
    }

    #[test]
    fn test_boolean_and_name() {
        assert!(is_valid_boolean("True"));
        assert!(is_valid_boolean(" false "));
        assert!(!is_valid_boolean("yes"));
        assert_eq!(parse_boolean("FALSE"), Some(false));

        assert!(is_valid_name_property("Smith"));
        assert!(!is_valid_name_property("   "));
        assert!(!is_valid_name_property(&"a".repeat(51)));
    }

    #[test]
    fn test_ssn() {
        assert!(is_valid_ssn("123-45-6789"));
        assert!(is_valid_ssn("123456789"));
        assert!(!is_valid_ssn("123-456789"));
        assert!(!is_valid_ssn("000-45-6789"));
        assert!(!is_valid_ssn("666-45-6789"));
        assert!(!is_valid_ssn("900-45-6789"));
        assert!(!is_valid_ssn("123-00-6789"));
        assert!(!is_valid_ssn("123-45-0000"));
        assert!(!is_valid_ssn("219-09-9999"));
        assert!(!is_valid_ssn("078051120"));
    }

    #[test]
    fn test_phone_carrier() {
        assert!(is_valid_phone_carrier("verizon"));
        assert!(!is_valid_phone_carrier("Carrier Pigeon"));
    }

    #[tokio::test]
    async fn test_reference_list_membership() {
        let lists = ListStore::new(init_database(":memory:").await.unwrap());
        lists
            .insert(
                &ReferenceList::new("1", "Genders", vec!["M".into(), "F".into()]),
                true,
            )
            .await
            .unwrap();
        lists
            .insert(
                &ReferenceList::new("2", "NECs", vec!["9102".into(), "2780".into()]),
                true,
            )
            .await
            .unwrap();

        assert_eq!(lists.get_list("Genders").unwrap().values, vec!["M", "F"]);
        assert!(is_valid_gender(&lists, "m"));
        assert!(!is_valid_gender(&lists, "x"));
        // Liste absente du cache.
        assert!(!is_valid_rank(&lists, "E1"));

        let necs = vec!["9102".to_string(), "2780".to_string()];
        assert!(are_valid_necs(&lists, &StringList::Values(&necs)));
        assert!(!are_valid_necs(&lists, &StringList::Json(r#"["9102", "0000"]"#)));
    }
}
