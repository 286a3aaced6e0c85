//! Naming and identifying subtitle languages.
//!
//! `*.idx` files identify streams by two-letter ISO 639-1 codes.  We keep
//! a built-in table of `(english_name, code)` rows; the row index is what
//! gets stored and what the idx writer uses to emit the `id:` block.

/// The built-in language table, ordered by English name.
pub static LANGUAGES: &'static [(&'static str, &'static str)] = &[
    ("Abkhazian", "ab"),
    ("Afar", "aa"),
    ("Afrikaans", "af"),
    ("Albanian", "sq"),
    ("Amharic", "am"),
    ("Arabic", "ar"),
    ("Aragonese", "an"),
    ("Armenian", "hy"),
    ("Assamese", "as"),
    ("Avaric", "av"),
    ("Aymara", "ay"),
    ("Azerbaijani", "az"),
    ("Bashkir", "ba"),
    ("Basque", "eu"),
    ("Belarusian", "be"),
    ("Bengali", "bn"),
    ("Bislama", "bi"),
    ("Bosnian", "bs"),
    ("Breton", "br"),
    ("Bulgarian", "bg"),
    ("Burmese", "my"),
    ("Catalan", "ca"),
    ("Chamorro", "ch"),
    ("Chechen", "ce"),
    ("Chinese", "zh"),
    ("Chuvash", "cv"),
    ("Cornish", "kw"),
    ("Corsican", "co"),
    ("Cree", "cr"),
    ("Croatian", "hr"),
    ("Czech", "cs"),
    ("Danish", "da"),
    ("Divehi", "dv"),
    ("Dutch", "nl"),
    ("Dzongkha", "dz"),
    ("English", "en"),
    ("Esperanto", "eo"),
    ("Estonian", "et"),
    ("Ewe", "ee"),
    ("Faroese", "fo"),
    ("Fijian", "fj"),
    ("Finnish", "fi"),
    ("French", "fr"),
    ("Fulah", "ff"),
    ("Galician", "gl"),
    ("Ganda", "lg"),
    ("Georgian", "ka"),
    ("German", "de"),
    ("Greek", "el"),
    ("Guarani", "gn"),
    ("Gujarati", "gu"),
    ("Haitian", "ht"),
    ("Hausa", "ha"),
    ("Hebrew", "he"),
    ("Herero", "hz"),
    ("Hindi", "hi"),
    ("Hungarian", "hu"),
    ("Icelandic", "is"),
    ("Ido", "io"),
    ("Igbo", "ig"),
    ("Indonesian", "id"),
    ("Interlingua", "ia"),
    ("Interlingue", "ie"),
    ("Inuktitut", "iu"),
    ("Inupiaq", "ik"),
    ("Irish", "ga"),
    ("Italian", "it"),
    ("Japanese", "ja"),
    ("Javanese", "jv"),
    ("Kannada", "kn"),
    ("Kanuri", "kr"),
    ("Kashmiri", "ks"),
    ("Kazakh", "kk"),
    ("Khmer", "km"),
    ("Kikuyu", "ki"),
    ("Kinyarwanda", "rw"),
    ("Kirghiz", "ky"),
    ("Komi", "kv"),
    ("Kongo", "kg"),
    ("Korean", "ko"),
    ("Kuanyama", "kj"),
    ("Kurdish", "ku"),
    ("Lao", "lo"),
    ("Latin", "la"),
    ("Latvian", "lv"),
    ("Limburgan", "li"),
    ("Lingala", "ln"),
    ("Lithuanian", "lt"),
    ("Luba-Katanga", "lu"),
    ("Luxembourgish", "lb"),
    ("Macedonian", "mk"),
    ("Malagasy", "mg"),
    ("Malay", "ms"),
    ("Malayalam", "ml"),
    ("Maltese", "mt"),
    ("Manx", "gv"),
    ("Maori", "mi"),
    ("Marathi", "mr"),
    ("Marshallese", "mh"),
    ("Mongolian", "mn"),
    ("Nauru", "na"),
    ("Navajo", "nv"),
    ("Ndonga", "ng"),
    ("Nepali", "ne"),
    ("North Ndebele", "nd"),
    ("Northern Sami", "se"),
    ("Norwegian", "no"),
    ("Norwegian Bokmal", "nb"),
    ("Norwegian Nynorsk", "nn"),
    ("Nyanja", "ny"),
    ("Occitan", "oc"),
    ("Ojibwa", "oj"),
    ("Oriya", "or"),
    ("Oromo", "om"),
    ("Ossetian", "os"),
    ("Pali", "pi"),
    ("Panjabi", "pa"),
    ("Persian", "fa"),
    ("Polish", "pl"),
    ("Portuguese", "pt"),
    ("Pushto", "ps"),
    ("Quechua", "qu"),
    ("Romanian", "ro"),
    ("Romansh", "rm"),
    ("Rundi", "rn"),
    ("Russian", "ru"),
    ("Samoan", "sm"),
    ("Sango", "sg"),
    ("Sanskrit", "sa"),
    ("Sardinian", "sc"),
    ("Scottish Gaelic", "gd"),
    ("Serbian", "sr"),
    ("Shona", "sn"),
    ("Sichuan Yi", "ii"),
    ("Sindhi", "sd"),
    ("Sinhala", "si"),
    ("Slovak", "sk"),
    ("Slovenian", "sl"),
    ("Somali", "so"),
    ("South Ndebele", "nr"),
    ("Southern Sotho", "st"),
    ("Spanish", "es"),
    ("Sundanese", "su"),
    ("Swahili", "sw"),
    ("Swati", "ss"),
    ("Swedish", "sv"),
    ("Tagalog", "tl"),
    ("Tahitian", "ty"),
    ("Tajik", "tg"),
    ("Tamil", "ta"),
    ("Tatar", "tt"),
    ("Telugu", "te"),
    ("Thai", "th"),
    ("Tibetan", "bo"),
    ("Tigrinya", "ti"),
    ("Tonga", "to"),
    ("Tsonga", "ts"),
    ("Tswana", "tn"),
    ("Turkish", "tr"),
    ("Turkmen", "tk"),
    ("Twi", "tw"),
    ("Uighur", "ug"),
    ("Ukrainian", "uk"),
    ("Urdu", "ur"),
    ("Uzbek", "uz"),
    ("Venda", "ve"),
    ("Vietnamese", "vi"),
    ("Volapuk", "vo"),
    ("Walloon", "wa"),
    ("Welsh", "cy"),
    ("Western Frisian", "fy"),
    ("Wolof", "wo"),
    ("Xhosa", "xh"),
    ("Yiddish", "yi"),
    ("Yoruba", "yo"),
    ("Zhuang", "za"),
    ("Zulu", "zu"),
];

/// Find the table row for a two-letter ISO 639-1 code, ignoring case.
pub fn find_by_code(code: &str) -> Option<usize> {
    LANGUAGES.iter().position(|&(_, c)| c.eq_ignore_ascii_case(code))
}

#[test]
fn look_up_codes() {
    let en = find_by_code("en").unwrap();
    assert_eq!(LANGUAGES[en].0, "English");
    assert_eq!(find_by_code("EN"), Some(en));
    assert_eq!(find_by_code("xx"), None);
}
