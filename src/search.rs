//! Approximate name lookup for the collection desk.

use crate::model::Student;

/// Matches scoring below this are dropped.
pub const MIN_SCORE: f64 = 0.4;

#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit<'a> {
    pub student: &'a Student,
    pub score: f64,
}

fn normalize(s: &str) -> String {
    s.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// True when the two words are at most one insertion, deletion or substitution apart.
fn within_one_edit(a: &str, b: &str) -> bool {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.len().abs_diff(b.len()) > 1 {
        return false;
    }
    let (short, long) = if a.len() <= b.len() { (&a, &b) } else { (&b, &a) };
    let (mut i, mut j, mut edits) = (0, 0, 0);
    while i < short.len() && j < long.len() {
        if short[i] == long[j] {
            i += 1;
            j += 1;
            continue;
        }
        edits += 1;
        if edits > 1 {
            return false;
        }
        if short.len() == long.len() {
            i += 1;
        }
        j += 1;
    }
    edits + (long.len() - j) + (short.len() - i) <= 1
}

/// Scores a candidate name against a query, both already normalized.
///
/// Names that contain neither the whole query nor a prefix of it score the
/// share of query words that match one of their words.
pub fn score(name: &str, query: &str) -> f64 {
    if query.is_empty() {
        return 0.0;
    }
    if name == query {
        return 1.0;
    }
    if name.starts_with(query) {
        return 0.9;
    }
    if name.contains(query) {
        return 0.75;
    }
    let tokens: Vec<&str> = name.split(' ').collect();
    let terms: Vec<&str> = query.split(' ').collect();
    let matched = terms
        .iter()
        .filter(|t| {
            tokens
                .iter()
                .any(|n| n.starts_with(*t) || within_one_edit(n, t))
        })
        .count();
    matched as f64 / terms.len() as f64
}

/// Best matches first; equal scores keep collection order.
pub fn search_students<'a>(students: &'a [Student], query: &str, limit: usize) -> Vec<SearchHit<'a>> {
    let query = normalize(query);
    if query.is_empty() {
        return Vec::new();
    }
    let mut hits: Vec<SearchHit<'a>> = students
        .iter()
        .map(|student| SearchHit {
            student,
            score: score(&normalize(&student.name), &query),
        })
        .filter(|hit| hit.score >= MIN_SCORE)
        .collect();
    hits.sort_by(|a, b| b.score.total_cmp(&a.score));
    hits.truncate(limit);
    hits
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn student(id: &str, name: &str) -> Student {
        Student {
            id: id.to_string(),
            name: name.to_string(),
            dob: NaiveDate::from_ymd_opt(2014, 1, 1).unwrap(),
            school_id: "external".to_string(),
            class_name: None,
            issued: false,
            claimant_info: None,
        }
    }

    #[test]
    fn ranking() {
        let students = vec![
            student("1", "Kwame Nkrumah"),
            student("2", "Kwame  Mensah"),
            student("3", "Ama Kwame"),
            student("4", "Efua Sutherland"),
        ];
        let ids: Vec<&str> = search_students(&students, "kwame", 10)
            .iter()
            .map(|h| h.student.id.as_str())
            .collect();
        assert_eq!(ids, vec!["1", "2", "3"]);

        let hits = search_students(&students, "KWAME MENSAH", 10);
        assert_eq!(hits[0].student.id, "2");
        assert_eq!(hits[0].score, 1.0);
    }

    #[test]
    fn tolerates_one_typo_per_word() {
        let students = vec![student("1", "Efua Sutherland"), student("2", "Kofi Annan")];
        let hits = search_students(&students, "sutherlnd efua", 10);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].student.id, "1");
        assert!(search_students(&students, "zzz", 10).is_empty());
        assert!(search_students(&students, "   ", 10).is_empty());
    }

    #[test]
    fn token_share_scores_reordered_and_partial_names() {
        assert_eq!(score("kwame mensah", "mensah kwame"), 1.0);
        assert_eq!(score("kwame mensah", "mensah kofi"), 0.5);
        assert_eq!(score("kwame mensah", "yaw kofi"), 0.0);

        let students = vec![student("1", "Kwame Mensah"), student("2", "Yaw Boakye")];
        let hits = search_students(&students, "mensah kofi", 10);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].student.id, "1");
        assert_eq!(hits[0].score, 0.5);
    }

    #[test]
    fn edit_distance_helper() {
        assert!(within_one_edit("kofi", "kofi"));
        assert!(within_one_edit("kofi", "kfi"));
        assert!(within_one_edit("kofi", "kofe"));
        assert!(within_one_edit("kofi", "kofii"));
        assert!(!within_one_edit("kofi", "kfe"));
        assert!(!within_one_edit("kofi", "ko"));
    }

    #[test]
    fn limit_applies_after_ranking() {
        let students = vec![student("1", "Ama Kwame"), student("2", "Kwame")];
        let hits = search_students(&students, "kwame", 1);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].student.id, "2");
    }
}
