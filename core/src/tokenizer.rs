use lazy_static::lazy_static;
use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};
use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;
use std::collections::HashSet;
use std::fmt;

lazy_static! {
    static ref RE: Regex = Regex::new(r"(?u)\p{L}[\p{L}\p{N}_']*").expect("valid regex");
    static ref FRENCH_STEMMER: Stemmer = Stemmer::create(Algorithm::French);
    static ref ENGLISH_STEMMER: Stemmer = Stemmer::create(Algorithm::English);
    static ref FRENCH_STOPWORDS: HashSet<&'static str> = {
        let words: &[&str] = &[
            "a","ai","aie","aient","aies","ait","as","au","aura","aurai","auraient","aurais","aurait","auras","aurez","auriez","aurions","aurons","auront","aux","avaient","avais","avait","avec","avez","aviez","avions","avons","ayant","ayez","ayons",
            "c","ce","ceci","cela","celà","ces","cet","cette",
            "d","dans","de","des","du",
            "elle","en","es","est","et","étaient","étais","était","étant","été","êtes","étiez","étions","eu","eue","eues","eurent","eus","eut","eux",
            "fûmes","furent","fus","fut",
            "il","ils","j","je",
            "l","la","le","les","leur","lui",
            "m","ma","mais","me","même","mes","moi","mon",
            "n","ne","nos","notre","nous",
            "on","ont","ou",
            "par","pas","pour",
            "qu","que","qui",
            "s","sa","se","sera","serai","seraient","serais","serait","seras","serez","seriez","serions","serons","seront","ses","soi","soient","sois","soit","sommes","son","sont","soyez","soyons","suis","sur",
            "t","ta","te","tes","toi","ton","tu",
            "un","une","vos","votre","vous","y"
        ];
        words.iter().copied().collect()
    };
    static ref ENGLISH_STOPWORDS: HashSet<&'static str> = {
        let words: &[&str] = &[
            "a","about","above","after","again","against","all","am","an","and","any","are","aren't","as","at",
            "be","because","been","before","being","below","between","both","but","by",
            "can","can't","cannot","could","couldn't",
            "did","didn't","do","does","doesn't","doing","don't","down","during",
            "each","few","for","from","further",
            "had","hadn't","has","hasn't","have","haven't","having","he","he'd","he'll","he's","her","here","here's","hers","herself","him","himself","his","how","how's",
            "i","i'd","i'll","i'm","i've","if","in","into","is","isn't","it","it's","its","itself",
            "let's","me","more","most","mustn't","my","myself",
            "no","nor","not","of","off","on","once","only","or","other","ought","our","ours","ourselves","out","over","own",
            "same","she","she'd","she'll","she's","should","shouldn't","so","some","such",
            "than","that","that's","the","their","theirs","them","themselves","then","there","there's","these","they","they'd","they'll","they're","they've","this","those","through","to","too",
            "under","until","up","very",
            "was","wasn't","we","we'd","we'll","we're","we've","were","weren't","what","what's","when","when's","where","where's","which","while","who","who's","whom","why","why's","with","won't","would","wouldn't",
            "you","you'd","you'll","you're","you've","your","yours","yourself","yourselves"
        ];
        words.iter().copied().collect()
    };
}

/// Articles and pronouns elided before a vowel in French ("l'eau", "qu'il").
const FRENCH_ELISIONS: &[&str] = &["l", "m", "t", "qu", "n", "s", "j", "d", "c", "jusqu", "quoiqu", "lorsqu", "puisqu"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    French,
    English,
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Language::French => f.write_str("french"),
            Language::English => f.write_str("english"),
        }
    }
}

impl std::str::FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "french" | "fr" => Ok(Language::French),
            "english" | "en" => Ok(Language::English),
            other => Err(format!("unsupported language `{other}`")),
        }
    }
}

/// Language-aware analyzer. The same instance must be used at index and query time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Analyzer {
    language: Language,
}

impl Analyzer {
    pub fn new(language: Language) -> Self {
        Self { language }
    }

    pub fn language(&self) -> Language {
        self.language
    }

    fn stemmer(&self) -> &'static Stemmer {
        match self.language {
            Language::French => &*FRENCH_STEMMER,
            Language::English => &*ENGLISH_STEMMER,
        }
    }

    fn is_stopword(&self, token: &str) -> bool {
        match self.language {
            Language::French => FRENCH_STOPWORDS.contains(token),
            Language::English => ENGLISH_STOPWORDS.contains(token),
        }
    }

    fn strip_elision<'a>(&self, token: &'a str) -> &'a str {
        if self.language != Language::French {
            return token;
        }
        match token.split_once('\'') {
            Some((head, tail)) if !tail.is_empty() && FRENCH_ELISIONS.contains(&head) => tail,
            _ => token,
        }
    }

    /// Tokenize text into (term, position) using NFKC normalization, lowercase, elision
    /// and stopword removal, and stemming. Positions count removed tokens too, so phrase
    /// offsets survive stopword gaps.
    pub fn analyze(&self, text: &str) -> Vec<(String, usize)> {
        let normalized = text.nfkc().collect::<String>().replace('\u{2019}', "'").to_lowercase();
        let mut tokens = Vec::new();
        for (pos, mat) in RE.find_iter(&normalized).enumerate() {
            let token = self.strip_elision(mat.as_str()).trim_end_matches('\'');
            if token.is_empty() || self.is_stopword(token) { continue; }
            let stem = self.stemmer().stem(token).to_string();
            tokens.push((stem, pos));
        }
        tokens
    }

    /// Analyzed terms only, positions dropped.
    pub fn terms(&self, text: &str) -> Vec<String> {
        self.analyze(text).into_iter().map(|(t, _)| t).collect()
    }
}

impl Default for Analyzer {
    fn default() -> Self {
        Self::new(Language::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn english_stems_run() {
        let t = Analyzer::new(Language::English).analyze("Running, runner's run!");
        assert!(t.iter().any(|(w, _)| w == "run"));
    }

    #[test]
    fn french_strips_elision_and_stopwords() {
        let a = Analyzer::new(Language::French);
        let terms = a.terms("L'eau de la mer");
        assert_eq!(terms.len(), 2);
        assert_eq!(terms[0], a.terms("eau")[0]);
    }

    #[test]
    fn curly_apostrophe_is_elided() {
        let a = Analyzer::new(Language::French);
        assert_eq!(a.terms("l\u{2019}église"), a.terms("église"));
    }

    #[test]
    fn positions_keep_stopword_gaps() {
        let a = Analyzer::new(Language::French);
        let toks = a.analyze("musée de la culture");
        assert_eq!(toks.len(), 2);
        assert_eq!(toks[0].1, 0);
        assert_eq!(toks[1].1, 3);
    }

    #[test]
    fn language_parses() {
        assert_eq!("FR".parse::<Language>().unwrap(), Language::French);
        assert!("klingon".parse::<Language>().is_err());
    }
}
