//! Ingredient string normalizer
//!
//! Turns a raw recipe line or product description into the comparison key
//! used by the resolver. Pure and deterministic; never fails. Empty or
//! garbage input yields `""`, which the resolver treats as unresolvable.
//!
//! **Pipeline (per comma-separated segment):**
//! 1. Lower-case, fold common accented letters, drop bracketed asides
//! 2. Drop qualifier phrases ("to taste", "for garnish", "optional", ...)
//! 3. Drop possessive `'s`
//! 4. Strip the leading quantity/unit/size run ("2 cups", "1½", "large")
//! 5. Strip preparation words anywhere ("chopped", "finely", "sifted", ...)
//! 6. Strip brand/retailer boilerplate tokens
//! 7. Keep `[a-z0-9-]` per token, trim dangling connectives
//!
//! Surviving segments are rejoined with `", "`. The whole pass is repeated
//! until the output stops changing, so `normalize(normalize(s)) == normalize(s)`.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

/// Upper bound on fixpoint passes; real input settles in two or three
const FRACTION_CHARS: &str = "½⅓⅔¼¾⅕⅖⅗⅘⅙⅚⅐⅛⅜⅝⅞⅑⅒";

static BRACKETED_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\([^()]*\)|\[[^\[\]]*\]|\{[^{}]*\}").expect("bracketed aside pattern")
});

static QUALIFIER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b(?:or to taste|to taste|as needed|as required|if desired|if needed|optional|divided|at room temperature|room temperature|for (?:garnish|garnishing|serving|dusting|greasing|frying|decoration|topping|the pan)|plus more(?: [a-z ]*)?|or more|more or less)\b",
    )
    .expect("qualifier phrase pattern")
});

static POSSESSIVE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([a-z0-9])['’]s\b").expect("possessive pattern"));

static QUANTITY_RE: Lazy<Regex> = Lazy::new(|| {
    let amount = format!(r"(?:\d+(?:[./]\d+)?|\d*[{}])", FRACTION_CHARS);
    Regex::new(&format!(r"^{a}(?:-{a})*(?:x)?$", a = amount)).expect("quantity pattern")
});

/// Number fused with a unit: "12oz", "400g", "1.5l"
static FUSED_QUANTITY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d+(?:[./]\d+)?(?:g|kg|mg|ml|cl|dl|l|oz|lb|lbs|qt|pt|ct|pk)$")
        .expect("fused quantity pattern")
});

const QUANTITY_WORDS: &[&str] = &[
    "a", "an", "one", "two", "three", "four", "five", "six", "seven", "eight", "nine", "ten",
    "eleven", "twelve", "half", "quarter", "dozen", "few", "couple", "several", "x",
];

const UNIT_WORDS: &[&str] = &[
    "cup", "cups", "c", "tablespoon", "tablespoons", "tbsp", "tbsps", "tbs", "tbl", "tblsp",
    "teaspoon", "teaspoons", "tsp", "tsps", "ounce", "ounces", "oz", "fl", "fluid", "pound",
    "pounds", "lb", "lbs", "gram", "grams", "g", "kilogram", "kilograms", "kg", "milligram",
    "milligrams", "mg", "milliliter", "milliliters", "millilitre", "millilitres", "ml", "liter",
    "liters", "litre", "litres", "l", "quart", "quarts", "qt", "pint", "pints", "pt", "gallon",
    "gallons", "gal", "can", "cans", "package", "packages", "pkg", "pkgs", "packet", "packets",
    "jar", "jars", "bottle", "bottles", "box", "boxes", "bag", "bags", "carton", "cartons",
    "container", "containers", "tin", "tins", "bunch", "bunches", "clove", "cloves", "head",
    "heads", "stalk", "stalks", "sprig", "sprigs", "slice", "slices", "stick", "sticks", "pinch",
    "pinches", "dash", "dashes", "handful", "handfuls", "piece", "pieces", "drop", "drops",
    "envelope", "envelopes", "count", "ct", "pack", "pk", "sheet", "sheets",
];

const SIZE_WORDS: &[&str] = &[
    "small", "medium", "large", "extra-large", "xl", "jumbo", "big", "heaping", "heaped",
    "rounded", "level", "scant", "generous", "mini", "family-size", "value-size",
];

const PREP_WORDS: &[&str] = &[
    "chopped", "diced", "minced", "sliced", "softened", "toasted", "grated", "shredded",
    "peeled", "seeded", "deseeded", "pitted", "cored", "crushed", "melted", "beaten", "whisked",
    "sifted", "packed", "cubed", "julienned", "halved", "quartered", "trimmed", "rinsed",
    "drained", "thawed", "mashed", "pureed", "zested", "squeezed", "juiced", "crumbled",
    "cooled", "chilled", "warmed", "scalded", "blanched", "torn", "snipped", "smashed",
    "finely", "coarsely", "roughly", "thinly", "thickly", "freshly", "lightly", "firmly",
    "loosely", "well", "very", "cut", "into", "pieces", "chunks", "strips", "rings", "wedges",
    "bite-size", "bite-sized", "prepared",
];

const DEFAULT_BOILERPLATE: &[&str] = &[
    "brand", "brands", "inc", "llc", "ltd", "corp", "co", "tm", "trademark", "registered",
    "kirkland", "signature", "365", "everyday", "essentials", "storebrand", "private", "label",
];

const CONNECTIVES: &[&str] = &["and", "or", "of", "plus", "with"];

/// Normalizer with a configurable boilerplate token list
#[derive(Debug, Clone)]
pub struct Normalizer {
    boilerplate: HashSet<String>,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self {
            boilerplate: DEFAULT_BOILERPLATE.iter().map(|s| s.to_string()).collect(),
        }
    }
}

static DEFAULT_NORMALIZER: Lazy<Normalizer> = Lazy::new(Normalizer::default);

/// Normalize with the default rules
pub fn normalize(raw: &str) -> String {
    DEFAULT_NORMALIZER.normalize(raw)
}

impl Normalizer {
    /// Default rules plus extra boilerplate tokens (retailer names etc.)
    pub fn with_boilerplate<I, S>(extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut normalizer = Self::default();
        for token in extra {
            let token = token.as_ref().trim().to_lowercase();
            if !token.is_empty() {
                normalizer.boilerplate.insert(token);
            }
        }
        normalizer
    }

    pub fn normalize(&self, raw: &str) -> String {
        let mut current = self.pass(raw);
        loop {
            let next = self.pass(&current);
            if next == current {
                return current;
            }
            // Passes only strip; a pass that does not shrink cannot settle
            if next.len() >= current.len() {
                tracing::debug!(input = %raw, output = %next, "Normalizer did not settle");
                return next;
            }
            current = next;
        }
    }

    fn pass(&self, input: &str) -> String {
        let lowered: String = input.to_lowercase().chars().map(fold_accent).collect();

        let mut text = lowered;
        while BRACKETED_RE.is_match(&text) {
            text = BRACKETED_RE.replace_all(&text, " ").into_owned();
        }

        let segments: Vec<String> = text
            .split(',')
            .map(|segment| self.clean_segment(segment))
            .filter(|segment| !segment.is_empty())
            .collect();

        segments.join(", ")
    }

    fn clean_segment(&self, segment: &str) -> String {
        let mut text = collapse_whitespace(segment);
        while QUALIFIER_RE.is_match(&text) {
            text = collapse_whitespace(&QUALIFIER_RE.replace_all(&text, " "));
        }
        let without_possessives = POSSESSIVE_RE.replace_all(&text, "$1");

        // Apostrophes vanish ("o'brien" -> "obrien"); other punctuation separates
        let spaced: String = without_possessives
            .chars()
            .filter(|c| *c != '\'' && *c != '’')
            .map(|c| if is_token_char(c) { c } else { ' ' })
            .collect();

        let tokens: Vec<&str> = spaced.split_whitespace().collect();
        let tokens = strip_leading_measure(&tokens);

        let mut kept: Vec<String> = Vec::with_capacity(tokens.len());
        for token in tokens {
            if is_prep_word(token) || self.boilerplate.contains(*token) {
                continue;
            }
            for piece in token.split(['.', '/']) {
                let cleaned: String = piece
                    .chars()
                    .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-')
                    .collect();
                let cleaned = cleaned.trim_matches('-');
                if !cleaned.is_empty() {
                    kept.push(cleaned.to_string());
                }
            }
        }

        trim_connectives(&mut kept);
        kept.join(" ")
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_token_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '/') || FRACTION_CHARS.contains(c)
}

fn fold_accent(c: char) -> char {
    match c {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' => 'a',
        'ç' => 'c',
        'è' | 'é' | 'ê' | 'ë' => 'e',
        'ì' | 'í' | 'î' | 'ï' => 'i',
        'ñ' => 'n',
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' => 'o',
        'ù' | 'ú' | 'û' | 'ü' => 'u',
        'ý' | 'ÿ' => 'y',
        other => other,
    }
}

fn is_quantity(token: &str) -> bool {
    QUANTITY_WORDS.contains(&token) || QUANTITY_RE.is_match(token)
}

/// Drop the leading run of quantities, units and size words
///
/// Unit words only count once a quantity has been seen, so "cloves" in
/// "ground cloves" survives while "2 cloves garlic" loses it.
fn strip_leading_measure<'a>(tokens: &'a [&'a str]) -> &'a [&'a str] {
    let mut seen_quantity = false;
    let mut start = 0;

    for token in tokens {
        let token = *token;
        let strippable = if is_quantity(token) || FUSED_QUANTITY_RE.is_match(token) {
            seen_quantity = true;
            true
        } else {
            SIZE_WORDS.contains(&token)
                || (seen_quantity && (UNIT_WORDS.contains(&token) || token == "of"))
        };
        if !strippable {
            break;
        }
        start += 1;
    }

    &tokens[start..]
}

fn is_prep_word(token: &str) -> bool {
    PREP_WORDS.contains(&token)
        || (token.contains('-') && token.split('-').all(|part| PREP_WORDS.contains(&part)))
}

fn trim_connectives(tokens: &mut Vec<String>) {
    while tokens
        .first()
        .is_some_and(|t| CONNECTIVES.contains(&t.as_str()))
    {
        tokens.remove(0);
    }
    while tokens
        .last()
        .is_some_and(|t| CONNECTIVES.contains(&t.as_str()))
    {
        tokens.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recipe_line_with_quantity_and_prep() {
        assert_eq!(normalize("2 cups all-purpose flour, sifted"), "all-purpose flour");
        assert_eq!(
            normalize("3/4 cups stone-ground whole wheat flour, sifted"),
            "stone-ground whole wheat flour"
        );
    }

    #[test]
    fn test_fractions_ranges_and_decimals() {
        assert_eq!(normalize("1½ tsp baking soda"), "baking soda");
        assert_eq!(normalize("½ cup sugar"), "sugar");
        assert_eq!(normalize("2-3 large eggs"), "eggs");
        assert_eq!(normalize("1.5 lbs ground beef"), "ground beef");
        assert_eq!(normalize("1-1/2 cups milk"), "milk");
        assert_eq!(normalize("12oz can tomatoes"), "tomatoes");
    }

    #[test]
    fn test_unit_words_need_a_quantity() {
        assert_eq!(normalize("ground cloves"), "ground cloves");
        assert_eq!(normalize("2 cloves garlic, minced"), "garlic");
        assert_eq!(normalize("a pinch of salt"), "salt");
    }

    #[test]
    fn test_parentheticals_and_qualifiers() {
        assert_eq!(normalize("1 (14.5 oz) can diced tomatoes"), "tomatoes");
        assert_eq!(normalize("salt and pepper to taste"), "salt and pepper");
        assert_eq!(normalize("fresh parsley, for garnish"), "fresh parsley");
        assert_eq!(normalize("chopped walnuts (optional)"), "walnuts");
        assert_eq!(normalize("butter, plus more for greasing"), "butter");
    }

    #[test]
    fn test_possessives_and_punctuation() {
        assert_eq!(normalize("Baker's Chocolate!!"), "baker chocolate");
        assert_eq!(normalize("Frank's RedHot® sauce"), "frank redhot sauce");
        assert_eq!(normalize("jalapeño peppers"), "jalapeno peppers");
    }

    #[test]
    fn test_catalog_description_keeps_comma_segments() {
        assert_eq!(normalize("FLOUR, WHEAT"), "flour, wheat");
        assert_eq!(
            normalize("KING ARTHUR UNBLEACHED ALL-PURPOSE FLOUR"),
            "king arthur unbleached all-purpose flour"
        );
        assert_eq!(normalize("Kirkland Signature Almond Butter"), "almond butter");
    }

    #[test]
    fn test_empty_and_garbage_input() {
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("   "), "");
        assert_eq!(normalize("2 cups"), "");
        assert_eq!(normalize("!!! ,,, ()"), "");
        assert_eq!(normalize("to taste"), "");
    }

    #[test]
    fn test_dangling_connectives_trimmed() {
        assert_eq!(normalize("2 cups of flour"), "flour");
        assert_eq!(normalize("milk and"), "milk");
        assert_eq!(normalize("with sugar"), "sugar");
    }

    #[test]
    fn test_idempotent_on_varied_input() {
        let inputs = [
            "2 cups all-purpose flour, sifted",
            "1 (14.5 oz) can diced tomatoes, drained",
            "KING ARTHUR UNBLEACHED ALL-PURPOSE FLOUR",
            "salt and/or pepper",
            "Baker's semi-sweet chocolate chips",
            "½ large onion, finely-chopped",
            "flour, wheat",
            "a dozen eggs (room temperature)",
            "",
        ];
        for input in inputs {
            let once = normalize(input);
            assert_eq!(normalize(&once), once, "not idempotent for {:?}", input);
        }
    }

    #[test]
    fn test_nested_qualifiers_settle() {
        let raw = format!("flour {}{}", "to ".repeat(10), "taste ".repeat(10));
        let once = normalize(&raw);
        assert_eq!(once, "flour");
        assert_eq!(normalize(&once), once);

        assert_eq!(normalize("salt to (chopped) taste"), "salt");
        assert_eq!(normalize("sugar as   needed"), "sugar");
    }

    #[test]
    fn test_extra_boilerplate_tokens() {
        let normalizer = Normalizer::with_boilerplate(["Northwind", " "]);
        assert_eq!(normalizer.normalize("NORTHWIND Rolled Oats"), "rolled oats");
        assert_eq!(normalize("NORTHWIND Rolled Oats"), "northwind rolled oats");
    }
}
