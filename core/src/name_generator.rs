//! Deterministic display names for customers and external counterparties.
//!
//! Names are cosmetic: nothing downstream keys on them. All generation is
//! deterministic (same stream = same names).

use crate::rng::SubsystemRng;

pub struct NameGenerator;

impl NameGenerator {
    pub fn person_name(rng: &mut SubsystemRng) -> String {
        let first = Self::pick(rng, FIRST_NAMES);
        let last = Self::pick(rng, LAST_NAMES);
        format!("{first} {last}")
    }

    /// "Prefix Industry Suffix" or "Surname Industry Suffix".
    pub fn company_name(rng: &mut SubsystemRng) -> String {
        let industry = Self::pick(rng, INDUSTRIES);
        let suffix = Self::pick(rng, COMPANY_SUFFIXES);
        if rng.chance(0.5) {
            format!("{} {industry} {suffix}", Self::pick(rng, COMPANY_PREFIXES))
        } else {
            format!("{} {industry} {suffix}", Self::pick(rng, LAST_NAMES))
        }
    }

    /// Correspondent bank holding an external counterparty's account.
    pub fn bank_name(rng: &mut SubsystemRng) -> String {
        format!("{} {}", Self::pick(rng, COMPANY_PREFIXES), Self::pick(rng, BANK_SUFFIXES))
    }

    fn pick(rng: &mut SubsystemRng, list: &[&'static str]) -> &'static str {
        rng.pick(list).copied().unwrap_or("Unknown")
    }
}

const FIRST_NAMES: &[&str] = &[
    "James", "Maria", "Wei", "Aisha", "Carlos", "Priya", "Liam", "Sofia", "Kenji", "Amara",
    "Noah", "Elena", "Omar", "Hannah", "Mateo", "Yuki", "Daniel", "Fatima", "Lucas", "Ingrid",
    "Ravi", "Chloe", "Tomás", "Grace", "Ahmed", "Mei", "Oliver", "Zanele", "Pierre", "Ana",
    "Samuel", "Leila", "Hiroshi", "Isabel", "Kwame", "Nadia", "Ethan", "Sana", "Felix", "Lucia",
];

const LAST_NAMES: &[&str] = &[
    "Smith", "Garcia", "Chen", "Okafor", "Müller", "Patel", "Silva", "Nguyen", "Kowalski", "Haddad",
    "Johnson", "Rossi", "Tanaka", "Dubois", "Kim", "Fernandez", "Brown", "Singh", "Novak", "Mensah",
    "Williams", "Lopez", "Wang", "Schmidt", "Ibrahim", "Costa", "Taylor", "Sato", "Moreau", "Ali",
    "Anderson", "Martins", "Zhang", "Jansen", "Cohen", "Reyes", "Walker", "Kumar", "Larsen", "Abbas",
];

const COMPANY_PREFIXES: &[&str] = &[
    "Global", "Pacific", "Atlantic", "Summit", "Northern", "Meridian", "Pinnacle", "Harbor",
    "Evergreen", "Crescent", "Sterling", "Horizon", "Keystone", "Silverline", "Orion", "Apex",
];

const INDUSTRIES: &[&str] = &[
    "Trading", "Logistics", "Holdings", "Consulting", "Imports", "Textiles", "Electronics",
    "Shipping", "Properties", "Commodities", "Ventures", "Foods", "Metals", "Energy",
];

const COMPANY_SUFFIXES: &[&str] = &["Ltd", "LLC", "Inc", "GmbH", "SA", "BV", "Pte Ltd", "FZE"];

const BANK_SUFFIXES: &[&str] = &["Bank", "Bank plc", "Banking Corp", "Trust Bank", "Bank AG"];
