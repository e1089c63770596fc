use mixsearch_core::{Analyzer, Language};

#[test]
fn french_analysis_matches_inflections() {
    let fr = Analyzer::new(Language::French);
    assert_eq!(fr.terms("plongée"), fr.terms("Plongées"));
    assert_eq!(fr.terms("musée"), fr.terms("MUSÉES"));
}

#[test]
fn french_elisions_and_stopwords_are_dropped() {
    let fr = Analyzer::new(Language::French);
    let words = fr.terms("L’eau de la plage et l'île");
    assert_eq!(words.len(), 3);
    assert_eq!(words[0], fr.terms("eau")[0]);
    assert!(!words.iter().any(|w| w == "de" || w == "la" || w == "et"));
}

#[test]
fn positions_keep_stopword_gaps() {
    let fr = Analyzer::new(Language::French);
    let toks = fr.analyze("musée de la mer");
    assert_eq!(toks.iter().map(|(_, p)| *p).collect::<Vec<_>>(), vec![0, 3]);
}

#[test]
fn english_stems_and_filters() {
    let en = Analyzer::new(Language::English);
    let words = en.terms("The Running runners and the lazy dog");
    assert!(words.contains(&"run".to_string()));
    assert!(!words.contains(&"the".to_string()));
    assert!(!words.contains(&"and".to_string()));
}

#[test]
fn compatibility_forms_are_normalized() {
    let en = Analyzer::new(Language::English);
    assert_eq!(en.terms("ﬁsh"), en.terms("fish"));
}
