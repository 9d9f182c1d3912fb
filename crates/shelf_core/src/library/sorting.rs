/// Name particles that belong to the last name, as in "Ursula K. Le Guin".
const SURNAME_PARTICLES: [&str; 13] = [
    "da", "de", "del", "della", "den", "der", "di", "du", "la", "le", "st.", "van", "von",
];

/// Leading articles moved to the end of a title.
const ARTICLES: [&str; 3] = ["A", "An", "The"];

/// Sort key for an author name: "lastname, everything else".
///
/// firstname lastname               ->  lastname, firstname         e.g. Brandon Sanderson
/// firstname m. lastname            ->  lastname, firstname m.      e.g. Peter V. Brett
/// f. f. f. lastname                ->  lastname, f. f. f.          e.g. J. R. R. Tolkien
/// firstname f. prefix lastname     ->  prefix lastname, firstname f.  e.g. Ursula K. Le Guin
/// singlename                       ->  singlename                  e.g. Baosu
///
/// "firstname middlename lastname" and "firstname lastname otherlastname" cannot be told apart,
/// the former is assumed since it is far more common.
#[must_use]
#[allow(clippy::missing_inline_in_public_items, reason = "Called rarely")]
pub fn get_name_sort(author_name: &str) -> String {
    let parts: Vec<&str> = author_name.split_whitespace().collect();
    let Some(mut start) = parts.len().checked_sub(1) else {
        return String::new();
    };
    if start == 0 {
        return parts.join(" ");
    }
    while start > 1
        && parts.get(start - 1).is_some_and(|part| {
            SURNAME_PARTICLES.contains(&part.to_lowercase().as_str())
        })
    {
        start -= 1;
    }
    let (given, last) = parts.split_at(start);
    format!("{}, {}", last.join(" "), given.join(" "))
}

/// Sort key for a title, moving a leading article to the end: "The Hobbit" -> "Hobbit, The".
#[must_use]
#[allow(clippy::missing_inline_in_public_items, reason = "Called rarely")]
pub fn get_title_sort(title: &str) -> String {
    let title = title.trim();
    if let Some((prefix, remainder)) = title.split_once(char::is_whitespace) {
        let remainder = remainder.trim();
        if ARTICLES.contains(&prefix) && !remainder.is_empty() {
            return format!("{remainder}, {prefix}");
        }
    }
    title.to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn name_keys(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| get_name_sort(name)).collect()
    }

    #[test]
    fn plain_names_put_surname_first() {
        assert_eq!(
            name_keys(&["Octavia Butler", "Iain Banks", "  Ann   Leckie "]),
            vec!["Butler, Octavia", "Banks, Iain", "Leckie, Ann"]
        );
    }

    #[test]
    fn initials_stay_with_given_names() {
        assert_eq!(
            name_keys(&["C. J. Cherryh", "Iain M. Banks", "P. D. James"]),
            vec!["Cherryh, C. J.", "Banks, Iain M.", "James, P. D."]
        );
    }

    #[test]
    fn particles_join_the_surname() {
        assert_eq!(
            name_keys(&["Antoine de Saint-Exupery", "Ursula K. Le Guin", "Jan van Eyck", "Von"]),
            vec!["de Saint-Exupery, Antoine", "Le Guin, Ursula K.", "van Eyck, Jan", "Von"]
        );
    }

    #[test]
    fn single_and_empty_names_are_unchanged() {
        assert_eq!(name_keys(&["Homer", "", "   "]), vec!["Homer", "", ""]);
    }

    #[test]
    fn leading_articles_move_to_the_end() {
        let titles = [
            "The Left Hand of Darkness",
            "A Wizard of Earthsea",
            "An Instance of the Fingerpost",
            "  The Dispossessed  ",
        ];
        let results: Vec<String> = titles.iter().map(|title| get_title_sort(title)).collect();
        assert_eq!(
            results,
            vec![
                "Left Hand of Darkness, The",
                "Wizard of Earthsea, A",
                "Instance of the Fingerpost, An",
                "Dispossessed, The",
            ]
        );
    }

    #[test]
    fn other_titles_are_only_trimmed() {
        let titles = ["Kindred", "Theodicy", "Anathem", "The", "the Road", " Dune "];
        let results: Vec<String> = titles.iter().map(|title| get_title_sort(title)).collect();
        assert_eq!(
            results,
            vec!["Kindred", "Theodicy", "Anathem", "The", "the Road", "Dune"]
        );
    }
}
