//! Verb tense classification for Spanish learner text.
//!
//! Tokens are looked up first in a table of high-frequency irregular verbs and
//! then matched against ordered regular-conjugation suffixes. Anything that
//! matches neither is not counted.

use super::{NONE_LABEL, tokenize};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

/// The six tense categories the classifier distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tense {
    Present,
    Preterite,
    Imperfect,
    Future,
    Conditional,
    Subjunctive,
}

impl Tense {
    pub const ALL: [Tense; 6] = [
        Tense::Present,
        Tense::Preterite,
        Tense::Imperfect,
        Tense::Future,
        Tense::Conditional,
        Tense::Subjunctive,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tense::Present => "present",
            Tense::Preterite => "preterite",
            Tense::Imperfect => "imperfect",
            Tense::Future => "future",
            Tense::Conditional => "conditional",
            Tense::Subjunctive => "subjunctive",
        }
    }
}

impl fmt::Display for Tense {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Occurrences of one tense in the analyzed text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenseUsage {
    pub tense: Tense,
    pub count: u32,
    /// Up to three distinct surface forms, in order of appearance.
    pub examples: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenseAnalysis {
    /// One entry per tense found, in order of first appearance in the text.
    pub tenses_found: Vec<TenseUsage>,
    pub total_tenses_used: u32,
    pub variety_score: u32,
    pub missing_tenses: Vec<Tense>,
    /// Name of the most frequent tense, or `"none"`.
    pub dominant_tense: String,
}

const MAX_EXAMPLES: usize = 3;

/// A high-frequency irregular verb. Conditional forms are derived from the
/// irregular future stem.
struct IrregularVerb {
    present: &'static [&'static str],
    preterite: &'static [&'static str],
    imperfect: &'static [&'static str],
    future_stem: &'static str,
    subjunctive: &'static [&'static str],
}

const FUTURE_ENDINGS: [&str; 6] = ["é", "ás", "á", "emos", "éis", "án"];
const CONDITIONAL_ENDINGS: [&str; 5] = ["ía", "ías", "íamos", "íais", "ían"];

#[rustfmt::skip]
const IRREGULAR_VERBS: &[(&str, IrregularVerb)] = &[
    ("ser", IrregularVerb {
        present: &["soy", "eres", "es", "somos", "sois", "son"],
        preterite: &["fui", "fuiste", "fue", "fuimos", "fuisteis", "fueron"],
        imperfect: &["era", "eras", "éramos", "erais", "eran"],
        future_stem: "ser",
        subjunctive: &["sea", "seas", "seamos", "seáis", "sean", "fuera", "fueras", "fuéramos", "fueran"],
    }),
    ("estar", IrregularVerb {
        present: &["estoy", "estás", "está", "estamos", "estáis", "están"],
        preterite: &["estuve", "estuviste", "estuvo", "estuvimos", "estuvisteis", "estuvieron"],
        imperfect: &["estaba", "estabas", "estábamos", "estabais", "estaban"],
        future_stem: "estar",
        subjunctive: &["esté", "estés", "estemos", "estéis", "estén", "estuviera", "estuvieras", "estuviéramos", "estuvieran"],
    }),
    ("ir", IrregularVerb {
        present: &["voy", "vas", "va", "vamos", "vais", "van"],
        preterite: &["fui", "fuiste", "fue", "fuimos", "fuisteis", "fueron"],
        imperfect: &["iba", "ibas", "íbamos", "ibais", "iban"],
        future_stem: "ir",
        subjunctive: &["vaya", "vayas", "vayamos", "vayáis", "vayan"],
    }),
    ("haber", IrregularVerb {
        present: &["he", "has", "ha", "hemos", "habéis", "han", "hay"],
        preterite: &["hube", "hubiste", "hubo", "hubimos", "hubieron"],
        imperfect: &["había", "habías", "habíamos", "habíais", "habían"],
        future_stem: "habr",
        subjunctive: &["haya", "hayas", "hayamos", "hayáis", "hayan", "hubiera", "hubieras", "hubiéramos", "hubieran"],
    }),
    ("tener", IrregularVerb {
        present: &["tengo", "tienes", "tiene", "tenemos", "tenéis", "tienen"],
        preterite: &["tuve", "tuviste", "tuvo", "tuvimos", "tuvisteis", "tuvieron"],
        imperfect: &["tenía", "tenías", "teníamos", "teníais", "tenían"],
        future_stem: "tendr",
        subjunctive: &["tenga", "tengas", "tengamos", "tengáis", "tengan", "tuviera", "tuvieras", "tuviéramos", "tuvieran"],
    }),
    ("hacer", IrregularVerb {
        present: &["hago", "haces", "hace", "hacemos", "hacéis", "hacen"],
        preterite: &["hice", "hiciste", "hizo", "hicimos", "hicisteis", "hicieron"],
        imperfect: &["hacía", "hacías", "hacíamos", "hacíais", "hacían"],
        future_stem: "har",
        subjunctive: &["haga", "hagas", "hagamos", "hagáis", "hagan", "hiciera", "hicieras", "hiciéramos", "hicieran"],
    }),
    ("poder", IrregularVerb {
        present: &["puedo", "puedes", "puede", "podemos", "podéis", "pueden"],
        preterite: &["pude", "pudiste", "pudo", "pudimos", "pudisteis", "pudieron"],
        imperfect: &["podía", "podías", "podíamos", "podíais", "podían"],
        future_stem: "podr",
        subjunctive: &["pueda", "puedas", "podamos", "podáis", "puedan", "pudiera", "pudieras", "pudiéramos", "pudieran"],
    }),
    ("decir", IrregularVerb {
        present: &["digo", "dices", "dice", "decimos", "decís", "dicen"],
        preterite: &["dije", "dijiste", "dijo", "dijimos", "dijisteis", "dijeron"],
        imperfect: &["decía", "decías", "decíamos", "decíais", "decían"],
        future_stem: "dir",
        subjunctive: &["diga", "digas", "digamos", "digáis", "digan", "dijera", "dijeras", "dijéramos", "dijeran"],
    }),
    ("ver", IrregularVerb {
        present: &["veo", "ves", "ve", "vemos", "veis", "ven"],
        preterite: &["vi", "viste", "vio", "vimos", "visteis", "vieron"],
        imperfect: &["veía", "veías", "veíamos", "veíais", "veían"],
        future_stem: "ver",
        subjunctive: &["vea", "veas", "veamos", "veáis", "vean", "viera", "vieras", "viéramos", "vieran"],
    }),
    ("dar", IrregularVerb {
        present: &["doy", "das", "da", "damos", "dais", "dan"],
        preterite: &["di", "diste", "dio", "dimos", "disteis", "dieron"],
        imperfect: &["daba", "dabas", "dábamos", "dabais", "daban"],
        future_stem: "dar",
        subjunctive: &["dé", "des", "demos", "deis", "den", "diera", "dieras", "diéramos", "dieran"],
    }),
    ("saber", IrregularVerb {
        present: &["sé", "sabes", "sabe", "sabemos", "sabéis", "saben"],
        preterite: &["supe", "supiste", "supo", "supimos", "supisteis", "supieron"],
        imperfect: &["sabía", "sabías", "sabíamos", "sabíais", "sabían"],
        future_stem: "sabr",
        subjunctive: &["sepa", "sepas", "sepamos", "sepáis", "sepan", "supiera", "supieras", "supiéramos", "supieran"],
    }),
    ("querer", IrregularVerb {
        present: &["quiero", "quieres", "quiere", "queremos", "queréis", "quieren"],
        preterite: &["quise", "quisiste", "quiso", "quisimos", "quisisteis", "quisieron"],
        imperfect: &["quería", "querías", "queríamos", "queríais", "querían"],
        future_stem: "querr",
        subjunctive: &["quiera", "quieras", "queramos", "queráis", "quieran", "quisiera", "quisieras", "quisiéramos", "quisieran"],
    }),
    ("poner", IrregularVerb {
        present: &["pongo", "pones", "pone", "ponemos", "ponéis", "ponen"],
        preterite: &["puse", "pusiste", "puso", "pusimos", "pusisteis", "pusieron"],
        imperfect: &["ponía", "ponías", "poníamos", "poníais", "ponían"],
        future_stem: "pondr",
        subjunctive: &["ponga", "pongas", "pongamos", "pongáis", "pongan", "pusiera", "pusieras", "pusiéramos", "pusieran"],
    }),
    ("venir", IrregularVerb {
        present: &["vengo", "vienes", "viene", "venimos", "venís", "vienen"],
        preterite: &["vine", "viniste", "vino", "vinimos", "vinisteis", "vinieron"],
        imperfect: &["venía", "venías", "veníamos", "veníais", "venían"],
        future_stem: "vendr",
        subjunctive: &["venga", "vengas", "vengamos", "vengáis", "vengan", "viniera", "vinieras", "viniéramos", "vinieran"],
    }),
    ("salir", IrregularVerb {
        present: &["salgo", "sales", "sale", "salimos", "salís", "salen"],
        preterite: &["salí", "saliste", "salió", "salisteis", "salieron"],
        imperfect: &["salía", "salías", "salíamos", "salíais", "salían"],
        future_stem: "saldr",
        subjunctive: &["salga", "salgas", "salgamos", "salgáis", "salgan", "saliera", "salieras", "saliéramos", "salieran"],
    }),
    ("traer", IrregularVerb {
        present: &["traigo", "traes", "trae", "traemos", "traéis", "traen"],
        preterite: &["traje", "trajiste", "trajo", "trajimos", "trajisteis", "trajeron"],
        imperfect: &["traía", "traías", "traíamos", "traíais", "traían"],
        future_stem: "traer",
        subjunctive: &["traiga", "traigas", "traigamos", "traigáis", "traigan", "trajera", "trajeras", "trajéramos", "trajeran"],
    }),
    ("conocer", IrregularVerb {
        present: &["conozco", "conoces", "conoce", "conocemos", "conocéis", "conocen"],
        preterite: &["conocí", "conociste", "conoció", "conocisteis", "conocieron"],
        imperfect: &["conocía", "conocías", "conocíamos", "conocíais", "conocían"],
        future_stem: "conocer",
        subjunctive: &["conozca", "conozcas", "conozcamos", "conozcáis", "conozcan", "conociera", "conocieras", "conociéramos", "conocieran"],
    }),
    ("pensar", IrregularVerb {
        present: &["pienso", "piensas", "piensa", "pensamos", "pensáis", "piensan"],
        preterite: &["pensé", "pensaste", "pensó", "pensasteis", "pensaron"],
        imperfect: &["pensaba", "pensabas", "pensábamos", "pensabais", "pensaban"],
        future_stem: "pensar",
        subjunctive: &["piense", "pienses", "pensemos", "penséis", "piensen", "pensara", "pensaras", "pensáramos", "pensaran"],
    }),
    ("creer", IrregularVerb {
        present: &["creo", "crees", "cree", "creemos", "creéis", "creen"],
        preterite: &["creí", "creíste", "creyó", "creímos", "creísteis", "creyeron"],
        imperfect: &["creía", "creías", "creíamos", "creíais", "creían"],
        future_stem: "creer",
        subjunctive: &["crea", "creas", "creamos", "creáis", "crean", "creyera", "creyeras", "creyéramos", "creyeran"],
    }),
    ("oír", IrregularVerb {
        present: &["oigo", "oyes", "oye", "oímos", "oís", "oyen"],
        preterite: &["oí", "oíste", "oyó", "oísteis", "oyeron"],
        imperfect: &["oía", "oías", "oíamos", "oíais", "oían"],
        future_stem: "oir",
        subjunctive: &["oiga", "oigas", "oigamos", "oigáis", "oigan", "oyera", "oyeras", "oyéramos", "oyeran"],
    }),
    ("gustar", IrregularVerb {
        present: &["gusta", "gustan"],
        preterite: &["gustó", "gustaron"],
        imperfect: &["gustaba", "gustaban"],
        future_stem: "gustar",
        subjunctive: &["guste", "gusten", "gustara", "gustaran"],
    }),
];

/// Surface form → tense. When a form appears under several verbs or tenses
/// the first entry in table order wins.
static IRREGULAR_FORMS: LazyLock<HashMap<String, Tense>> = LazyLock::new(|| {
    let mut forms = HashMap::new();
    for (_, verb) in IRREGULAR_VERBS {
        let listed = [
            (Tense::Present, verb.present),
            (Tense::Preterite, verb.preterite),
            (Tense::Imperfect, verb.imperfect),
            (Tense::Subjunctive, verb.subjunctive),
        ];
        for (tense, words) in listed {
            for word in words {
                forms.entry((*word).to_string()).or_insert(tense);
            }
        }
        for ending in FUTURE_ENDINGS {
            forms
                .entry(format!("{}{}", verb.future_stem, ending))
                .or_insert(Tense::Future);
        }
        for ending in CONDITIONAL_ENDINGS {
            forms
                .entry(format!("{}{}", verb.future_stem, ending))
                .or_insert(Tense::Conditional);
        }
    }
    forms
});

/// A regular conjugation ending together with the shortest stem it may
/// follow, so that short function words are not mistaken for verbs.
struct SuffixPattern {
    suffix: &'static str,
    min_stem: usize,
    tense: Tense,
}

const fn pattern(suffix: &'static str, min_stem: usize, tense: Tense) -> SuffixPattern {
    SuffixPattern {
        suffix,
        min_stem,
        tense,
    }
}

/// Checked in order; the first match decides the tense. Conditional endings
/// precede the imperfect `-ía` they contain, and future endings precede the
/// unaccented subjunctive ones.
#[rustfmt::skip]
const REGULAR_PATTERNS: &[SuffixPattern] = &[
    // Conditional
    pattern("aríamos", 2, Tense::Conditional), pattern("eríamos", 2, Tense::Conditional),
    pattern("iríamos", 2, Tense::Conditional), pattern("aríais", 2, Tense::Conditional),
    pattern("eríais", 2, Tense::Conditional), pattern("iríais", 2, Tense::Conditional),
    pattern("arían", 2, Tense::Conditional), pattern("erían", 2, Tense::Conditional),
    pattern("irían", 2, Tense::Conditional), pattern("arías", 2, Tense::Conditional),
    pattern("erías", 2, Tense::Conditional), pattern("irías", 2, Tense::Conditional),
    pattern("aría", 2, Tense::Conditional), pattern("ería", 2, Tense::Conditional),
    pattern("iría", 2, Tense::Conditional),
    // Future
    pattern("aremos", 2, Tense::Future), pattern("eremos", 2, Tense::Future),
    pattern("iremos", 2, Tense::Future), pattern("aréis", 2, Tense::Future),
    pattern("eréis", 2, Tense::Future), pattern("iréis", 2, Tense::Future),
    pattern("arán", 2, Tense::Future), pattern("erán", 2, Tense::Future),
    pattern("irán", 2, Tense::Future), pattern("arás", 2, Tense::Future),
    pattern("erás", 2, Tense::Future), pattern("irás", 2, Tense::Future),
    pattern("ará", 2, Tense::Future), pattern("erá", 2, Tense::Future),
    pattern("irá", 2, Tense::Future), pattern("aré", 2, Tense::Future),
    pattern("eré", 2, Tense::Future), pattern("iré", 2, Tense::Future),
    // Subjunctive (imperfect -ra/-se and present -emos/-éis of -ar verbs are ambiguous; only unambiguous endings)
    pattern("áramos", 2, Tense::Subjunctive), pattern("iéramos", 2, Tense::Subjunctive),
    pattern("ásemos", 2, Tense::Subjunctive), pattern("iésemos", 2, Tense::Subjunctive),
    pattern("ieran", 2, Tense::Subjunctive), pattern("ieras", 2, Tense::Subjunctive),
    pattern("iera", 2, Tense::Subjunctive), pattern("iesen", 2, Tense::Subjunctive),
    pattern("ieses", 2, Tense::Subjunctive), pattern("iese", 2, Tense::Subjunctive),
    pattern("aran", 3, Tense::Subjunctive), pattern("aras", 3, Tense::Subjunctive),
    pattern("ara", 3, Tense::Subjunctive), pattern("asen", 3, Tense::Subjunctive),
    pattern("ases", 3, Tense::Subjunctive), pattern("ase", 3, Tense::Subjunctive),
    // Imperfect
    pattern("ábamos", 2, Tense::Imperfect), pattern("abais", 2, Tense::Imperfect),
    pattern("aban", 2, Tense::Imperfect), pattern("abas", 2, Tense::Imperfect),
    pattern("aba", 2, Tense::Imperfect), pattern("íamos", 2, Tense::Imperfect),
    pattern("íais", 2, Tense::Imperfect), pattern("ían", 2, Tense::Imperfect),
    pattern("ías", 2, Tense::Imperfect), pattern("ía", 2, Tense::Imperfect),
    // Preterite
    pattern("asteis", 2, Tense::Preterite), pattern("isteis", 2, Tense::Preterite),
    pattern("ieron", 2, Tense::Preterite), pattern("aron", 2, Tense::Preterite),
    pattern("aste", 2, Tense::Preterite), pattern("iste", 2, Tense::Preterite),
    pattern("ió", 2, Tense::Preterite), pattern("ó", 3, Tense::Preterite),
    pattern("é", 3, Tense::Preterite), pattern("í", 3, Tense::Preterite),
    // Present (first-person -o is left out: it collides with too many nouns)
    pattern("amos", 2, Tense::Present), pattern("emos", 2, Tense::Present),
    pattern("imos", 2, Tense::Present), pattern("áis", 2, Tense::Present),
    pattern("éis", 2, Tense::Present), pattern("an", 3, Tense::Present),
    pattern("en", 3, Tense::Present),
];

/// Non-finite endings (gerund, participle). Tokens carrying them are not
/// conjugated verbs.
const NON_FINITE_ENDINGS: &[(&str, usize)] = &[
    ("ando", 2),
    ("iendo", 2),
    ("yendo", 1),
    ("ados", 2),
    ("idos", 2),
    ("ado", 2),
    ("ido", 2),
];

/// Frequent words that happen to end like a conjugated verb.
#[rustfmt::skip]
const NON_VERBS: &[&str] = &[
    "aquí", "allí", "así", "sí", "ahí", "café", "bebé", "también", "además", "según",
    "imagen", "imágenes", "joven", "origen", "examen", "orden", "resumen", "volumen", "virgen",
    "todavía", "alegría", "energía", "policía", "compañía", "economía", "fotografía",
    "geografía", "tecnología", "mayoría", "categoría", "garantía", "galería", "librería",
    "panadería", "cafetería", "carnicería", "pizzería", "joyería", "lotería", "guía",
    "para", "cara", "clara", "mientras", "antes", "después", "entonces", "ciudadano",
    // pronouns and nouns caught by -en / -an
    "quien", "alguien", "crimen", "margen", "carmen", "régimen", "abdomen", "certamen",
    "esteban", "sebastian", "cristian", "adrian",
    // nouns and names caught by -ía / -é
    "maría", "lucía", "sofía", "garcía", "poesía", "fantasía", "filosofía", "biología",
    "melodía", "armonía", "minoría", "batería", "cortesía", "valentía", "peluquería",
    "frutería", "ingeniería", "mediodía", "tranvía", "sandía", "josé",
    // adjectives caught by -emos / -imos
    "extremos", "supremos", "primos", "últimos", "mínimos", "máximos", "íntimos",
];

/// Finds the tense a single lowercase token is conjugated in.
pub fn classify_token(token: &str) -> Option<Tense> {
    if let Some(tense) = IRREGULAR_FORMS.get(token) {
        return Some(*tense);
    }
    if NON_VERBS.contains(&token) {
        return None;
    }
    if NON_FINITE_ENDINGS
        .iter()
        .any(|(ending, min_stem)| has_suffix(token, ending, *min_stem))
    {
        return None;
    }
    REGULAR_PATTERNS
        .iter()
        .find(|p| has_suffix(token, p.suffix, p.min_stem))
        .map(|p| p.tense)
}

fn has_suffix(token: &str, suffix: &str, min_stem: usize) -> bool {
    token
        .strip_suffix(suffix)
        .is_some_and(|stem| stem.chars().count() >= min_stem)
}

/// Classifies every token of `text` and summarizes the tense distribution.
///
/// `dominant_tense` ties go to the tense that appeared first in the text.
pub fn analyze_tenses(text: &str) -> TenseAnalysis {
    let mut found: Vec<TenseUsage> = Vec::new();

    for token in tokenize(text, char::is_alphanumeric) {
        let Some(tense) = classify_token(&token) else {
            continue;
        };
        match found.iter_mut().find(|u| u.tense == tense) {
            Some(usage) => {
                usage.count += 1;
                if usage.examples.len() < MAX_EXAMPLES && !usage.examples.contains(&token) {
                    usage.examples.push(token);
                }
            }
            None => found.push(TenseUsage {
                tense,
                count: 1,
                examples: vec![token],
            }),
        }
    }

    let distinct = found.len() as u32;
    let variety_score = (10.0 * distinct as f64 / Tense::ALL.len() as f64).round() as u32;
    let missing_tenses = Tense::ALL
        .into_iter()
        .filter(|t| !found.iter().any(|u| u.tense == *t))
        .collect();

    let mut dominant: Option<&TenseUsage> = None;
    for usage in &found {
        if dominant.is_none_or(|d| usage.count > d.count) {
            dominant = Some(usage);
        }
    }
    let dominant_tense = dominant
        .map(|u| u.tense.to_string())
        .unwrap_or_else(|| NONE_LABEL.to_string());

    TenseAnalysis {
        total_tenses_used: distinct,
        variety_score,
        missing_tenses,
        dominant_tense,
        tenses_found: found,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usage(analysis: &TenseAnalysis, tense: Tense) -> Option<&TenseUsage> {
        analysis.tenses_found.iter().find(|u| u.tense == tense)
    }

    #[test]
    fn test_empty_text_reports_everything_missing() {
        let analysis = analyze_tenses("");
        assert!(analysis.tenses_found.is_empty());
        assert_eq!(analysis.total_tenses_used, 0);
        assert_eq!(analysis.variety_score, 0);
        assert_eq!(analysis.missing_tenses, Tense::ALL.to_vec());
        assert_eq!(analysis.dominant_tense, "none");
    }

    #[test]
    fn test_irregular_forms_across_three_tenses() {
        let analysis = analyze_tenses("Soy feliz, fui a la playa y sería genial.");

        assert_eq!(usage(&analysis, Tense::Present).unwrap().examples, vec!["soy"]);
        assert_eq!(usage(&analysis, Tense::Preterite).unwrap().examples, vec!["fui"]);
        assert_eq!(
            usage(&analysis, Tense::Conditional).unwrap().examples,
            vec!["sería"]
        );
        assert_eq!(
            analysis.missing_tenses,
            vec![Tense::Imperfect, Tense::Future, Tense::Subjunctive]
        );
        assert_eq!(analysis.total_tenses_used, 3);
        assert_eq!(analysis.variety_score, 5);
        // Every count is 1, so the first tense in the text wins.
        assert_eq!(analysis.dominant_tense, "present");
    }

    #[test]
    fn test_dominant_tie_follows_first_appearance() {
        let analysis = analyze_tenses("fui soy fue es");
        assert_eq!(analysis.dominant_tense, "preterite");
    }

    #[test]
    fn test_dominant_picks_highest_count() {
        let analysis = analyze_tenses("fui soy es somos");
        assert_eq!(analysis.dominant_tense, "present");
        assert_eq!(usage(&analysis, Tense::Present).unwrap().count, 3);
    }

    #[test]
    fn test_regular_suffixes() {
        assert_eq!(classify_token("hablaba"), Some(Tense::Imperfect));
        assert_eq!(classify_token("comía"), Some(Tense::Imperfect));
        assert_eq!(classify_token("comería"), Some(Tense::Conditional));
        assert_eq!(classify_token("viviremos"), Some(Tense::Future));
        assert_eq!(classify_token("hablará"), Some(Tense::Future));
        assert_eq!(classify_token("hablara"), Some(Tense::Subjunctive));
        assert_eq!(classify_token("comieran"), Some(Tense::Subjunctive));
        assert_eq!(classify_token("habló"), Some(Tense::Preterite));
        assert_eq!(classify_token("comieron"), Some(Tense::Preterite));
        assert_eq!(classify_token("caminamos"), Some(Tense::Present));
        assert_eq!(classify_token("bailan"), Some(Tense::Present));
    }

    #[test]
    fn test_irregular_future_and_conditional_come_from_stem() {
        assert_eq!(classify_token("tendremos"), Some(Tense::Future));
        assert_eq!(classify_token("podría"), Some(Tense::Conditional));
        assert_eq!(classify_token("haríamos"), Some(Tense::Conditional));
    }

    #[test]
    fn test_non_verbs_are_ignored() {
        for word in [
            "la", "de", "feliz", "playa", "imagen", "aquí", "hablando", "comido", "día", "quien",
            "alguien", "maría", "lucía", "josé", "esteban", "primos", "últimos", "poesía",
        ] {
            assert_eq!(classify_token(word), None, "{word} should not be a verb");
        }
    }

    #[test]
    fn test_examples_are_distinct_and_capped() {
        let analysis = analyze_tenses("soy soy es eres somos son");
        let present = usage(&analysis, Tense::Present).unwrap();
        assert_eq!(present.count, 6);
        assert_eq!(present.examples, vec!["soy", "es", "eres"]);
    }

    #[test]
    fn test_variety_score_formula() {
        let analysis = analyze_tenses("soy fui era seré sería sea");
        assert_eq!(analysis.total_tenses_used, 6);
        assert_eq!(analysis.variety_score, 10);
        assert!(analysis.missing_tenses.is_empty());

        let one = analyze_tenses("soy");
        assert_eq!(one.variety_score, 2);
    }

    #[test]
    fn test_punctuation_is_stripped() {
        let analysis = analyze_tenses("¿Fui? ¡Sí, fui!");
        assert_eq!(usage(&analysis, Tense::Preterite).unwrap().count, 2);
    }

    #[test]
    fn test_is_idempotent() {
        let text = "Ayer fui al mercado y compré fruta; mañana iré otra vez.";
        assert_eq!(analyze_tenses(text), analyze_tenses(text));
    }
}
