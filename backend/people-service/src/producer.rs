//! Random person records for the demo producer

use chrono::Utc;
use idempotent_sink::Person;
use rand::seq::SliceRandom;
use rand::Rng;

pub const FIRST_NAMES: &[&str] = &[
    "Hans", "Brian", "Janet", "Wilma", "Barry", "Wodan", "Betty", "Daisy", "Caroline", "Karen",
    "Fonz", "Richard", "Thomas", "Frank", "Doris", "Michael", "Joel", "Taylor",
];

/// Ages are drawn from `MIN_AGE..MIN_AGE + MAX_AGE`
pub const MAX_AGE: i32 = 90;
pub const MIN_AGE: i32 = 3;

pub fn random_person<R: Rng + ?Sized>(rng: &mut R) -> Person {
    let name = FIRST_NAMES.choose(rng).copied().unwrap_or("Stranger");
    let age = rng.gen_range(0..MAX_AGE) + MIN_AGE;

    Person::new(
        name,
        age,
        format!("created by person-producer at {}", Utc::now().to_rfc3339()),
    )
}

/// Message key and JSON payload for a person
pub fn encode_person(person: &Person) -> Result<(String, String), serde_json::Error> {
    Ok((person.name.clone(), serde_json::to_string(person)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_random_person_in_range() {
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..200 {
            let person = random_person(&mut rng);
            assert!(FIRST_NAMES.contains(&person.name.as_str()));
            assert!((MIN_AGE..MIN_AGE + MAX_AGE).contains(&person.age));
            assert!(person.validate().is_ok());
        }
    }

    #[test]
    fn test_encode_person_keys_by_name() {
        let (key, payload) = encode_person(&Person::new("Doris", 51, "")).unwrap();
        assert_eq!(key, "Doris");

        let decoded: Person = serde_json::from_str(&payload).unwrap();
        assert_eq!(decoded.age, 51);
    }
}
