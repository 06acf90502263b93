use once_cell::sync::Lazy;
use regex::Regex;

/// Legal-entity suffixes and articles stripped from business names
static LEGAL_TERMS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(Inc\.?|Corp\.?|Corporation|LLC|LLP|LLLP|PLLC|LC|Co\.?|Company|Incorporated|Limited|Ltd\.?|PLC|P\.L\.C\.?|LTD|L\.P\.?|LP|GP|PC|P\.C\.?|PA|P\.A\.?|PROF\.? CORP\.?|Professional Corporation|GmbH|AG|KG|OHG|UG|BV|N\.V\.?|NV|PTE\.? LTD\.?|SDN\.? BHD\.?|PTY\.? LTD\.?|The|A|An|SRL|S\.R\.L\.?|SA|S\.A\.?|Corporación|Ltda\.?|Limitada|Sociedad|S\.E\.?)\b",
    )
    .expect("legal terms pattern is valid")
});

/// English and Spanish stop words
static STOP_WORDS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(the|de|del|la|los|las|el|y|and|of)\b").expect("stop words pattern is valid"));

static PARENTHETICAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"\([^)]*\)").expect("parenthetical pattern is valid"));

static PUNCTUATION: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s]").expect("punctuation pattern is valid"));

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("whitespace pattern is valid"));

fn normalize_once(name: &str) -> String {
    let lowered = name.to_lowercase();
    let without_parens = PARENTHETICAL.replace_all(&lowered, "");
    let without_legal = LEGAL_TERMS.replace_all(&without_parens, "");
    let without_stop = STOP_WORDS.replace_all(&without_legal, "");
    let without_punct = PUNCTUATION.replace_all(&without_stop, "");
    WHITESPACE.replace_all(&without_punct, " ").trim().to_string()
}

/// Canonical form of a business name used for every comparison.
///
/// Lower-cases, drops parenthetical content, legal suffixes, stop words and
/// punctuation, then collapses whitespace. Stripping punctuation can expose a
/// new suffix ("l.l.c" becomes "llc"), so the pass repeats until the output is
/// stable; each pass only removes characters.
pub fn normalize_name(name: &str) -> String {
    let mut current = normalize_once(name);
    loop {
        let next = normalize_once(&current);
        if next == current {
            return current;
        }
        current = next;
    }
}

/// Sort whitespace-separated tokens and rejoin them
fn token_sort(value: &str) -> String {
    let mut tokens: Vec<&str> = value.split_whitespace().collect();
    tokens.sort_unstable();
    tokens.join(" ")
}

/// Length of the longest common character subsequence
fn lcs_len(a: &[char], b: &[char]) -> usize {
    let mut row = vec![0usize; b.len() + 1];
    for &ca in a {
        let mut diagonal = 0;
        for (j, &cb) in b.iter().enumerate() {
            let above = row[j + 1];
            row[j + 1] = if ca == cb { diagonal + 1 } else { above.max(row[j]) };
            diagonal = above;
        }
    }
    row[b.len()]
}

/// Indel ratio: `2 * LCS / (len_a + len_b)`, scaled to `[0, 100]`
fn indel_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 100.0;
    }
    200.0 * lcs_len(&a, &b) as f64 / total as f64
}

/// Token-order-insensitive similarity in `[0, 100]`.
///
/// Both inputs are normalized first. An empty normalized name never matches.
pub fn name_similarity(a: &str, b: &str) -> f64 {
    let a = token_sort(&normalize_name(a));
    let b = token_sort(&normalize_name(b));

    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 100.0;
    }

    indel_ratio(&a, &b)
}
