//! Vocabulary level estimation against three proficiency word lists.

use super::{round1, round2, tokenize};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// CEFR-like level estimated from the vocabulary spread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CefrLevel {
    A1,
    A2,
    B1,
    B2,
    C1,
    /// Nothing to estimate from.
    #[serde(rename = "N/A")]
    NotApplicable,
}

impl fmt::Display for CefrLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            CefrLevel::A1 => "A1",
            CefrLevel::A2 => "A2",
            CefrLevel::B1 => "B1",
            CefrLevel::B2 => "B2",
            CefrLevel::C1 => "C1",
            CefrLevel::NotApplicable => "N/A",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WordBucket {
    Elementary,
    Intermediate,
    Advanced,
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketShare {
    pub level: WordBucket,
    pub count: u32,
    pub percentage: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VocabularyAnalysis {
    pub estimated_level: CefrLevel,
    pub lexical_diversity: f64,
    /// Always four entries: elementary, intermediate, advanced, other.
    pub word_distribution: Vec<BucketShare>,
    pub advanced_words: Vec<String>,
    pub complexity_score: f64,
}

#[rustfmt::skip]
const ELEMENTARY_WORDS: &[&str] = &[
    "casa", "familia", "comida", "agua", "grande", "pequeño", "pequeña", "bueno", "buena",
    "malo", "mala", "feliz", "triste", "amigo", "amiga", "amigos", "escuela", "colegio",
    "hoy", "ayer", "mañana", "comer", "beber", "hablar", "vivir", "tener", "hacer", "día",
    "noche", "padre", "madre", "padres", "hermano", "hermana", "perro", "gato", "ciudad",
    "calle", "playa", "sol", "ropa", "fiesta", "música", "libro", "bonito", "bonita", "feo",
    "mucho", "mucha", "muchos", "poco", "siempre", "nunca", "también", "porque", "pero",
    "gente", "persona", "personas", "niño", "niña", "niños", "año", "años", "tiempo",
    "trabajo", "comprar", "jugar", "mirar", "ver", "gustar", "color", "colores", "rojo",
    "azul", "verde", "blanco", "negro", "mesa", "coche", "tienda", "mercado", "fruta", "pan",
    "deporte", "fútbol", "parque", "hola", "gracias", "bien", "mal", "aquí", "allí",
    "hombre", "mujer", "foto", "imagen", "cosa", "cosas", "grupo", "baile", "bailar",
    "cultura", "vacaciones", "viaje", "país", "comer", "caminar",
];

#[rustfmt::skip]
const INTERMEDIATE_WORDS: &[&str] = &[
    "aunque", "mientras", "además", "tradición", "tradiciones", "tradicional", "cultura",
    "costumbre", "costumbres", "celebración", "ambiente", "sociedad", "comunidad",
    "desarrollo", "importante", "necesario", "diferente", "diferentes", "experiencia",
    "oportunidad", "problema", "problemas", "solución", "contaminación", "tecnología",
    "juventud", "generación", "influencia", "opinión", "considerar", "demostrar",
    "representar", "representa", "reflejar", "refleja", "mostrar", "muestra", "destacar",
    "aspecto", "ventaja", "desventaja", "relación", "actividad", "patrimonio", "turismo",
    "turistas", "festival", "religión", "religioso", "religiosa", "histórico", "histórica",
    "antiguo", "antigua", "moderno", "moderna", "urbano", "rural", "paisaje", "sugerir",
    "parecer", "probablemente", "seguramente", "quizás", "conseguir", "mejorar",
    "aumentar", "reducir", "preocupación", "beneficio", "salud", "educación", "igualdad",
    "derechos", "población", "emigración", "inmigración", "identidad", "idioma", "lengua",
    "gobierno", "económico", "económica", "social", "político", "política", "ambiental",
    "proteger", "conservar", "participar", "colaborar", "evidente", "actualmente",
    "realmente", "especialmente", "finalmente", "principalmente", "ejemplo", "razón",
    "significado", "simbolizar", "integración", "desafío", "recursos", "medioambiente",
];

#[rustfmt::skip]
const ADVANCED_WORDS: &[&str] = &[
    "obstante", "consiguiente", "asimismo", "enriquecer", "fomentar", "perpetuar",
    "arraigado", "arraigada", "idiosincrasia", "cosmovisión", "multiculturalismo",
    "globalización", "sostenibilidad", "desigualdad", "marginación", "reivindicar",
    "reivindicación", "trascender", "trascendental", "paradigma", "menoscabar",
    "ineludible", "imprescindible", "primordial", "predominante", "heterogéneo",
    "homogéneo", "intrínseco", "inherente", "vislumbrar", "subyacente", "fenómeno",
    "acontecimiento", "conllevar", "desencadenar", "propiciar", "salvaguardar",
    "indudablemente", "ende", "paulatinamente", "contundente", "polifacético",
    "emblemático", "emblemática", "simbolismo", "ancestral", "sincretismo", "mestizaje",
    "efímero", "perdurable", "cotidianidad", "alienación", "consumismo", "hegemonía",
    "estereotipo", "estereotipos", "prejuicio", "prejuicios", "discriminación",
    "exclusión", "sobrellevar", "concienciar", "concienciación", "yuxtaposición",
];

/// Classifies one token, preferring the most advanced list it appears in.
pub fn classify_word(word: &str) -> WordBucket {
    if ADVANCED_WORDS.contains(&word) {
        WordBucket::Advanced
    } else if INTERMEDIATE_WORDS.contains(&word) {
        WordBucket::Intermediate
    } else if ELEMENTARY_WORDS.contains(&word) {
        WordBucket::Elementary
    } else {
        WordBucket::Other
    }
}

/// Threshold ladder from bucket counts of unique words.
pub fn estimate_level(elementary: u32, intermediate: u32, advanced: u32) -> CefrLevel {
    if advanced >= 3 && intermediate >= 5 {
        CefrLevel::C1
    } else if advanced >= 1 && intermediate >= 3 {
        CefrLevel::B2
    } else if intermediate >= 2 {
        CefrLevel::B1
    } else if elementary >= 3 {
        CefrLevel::A2
    } else {
        CefrLevel::A1
    }
}

const MAX_DIVERSITY_COMPONENT: f64 = 4.0;
const MAX_LEVEL_COMPONENT: f64 = 6.0;

/// Estimates vocabulary level, lexical diversity and complexity of `text`.
pub fn analyze_vocabulary(text: &str) -> VocabularyAnalysis {
    let tokens: Vec<String> = tokenize(text, char::is_alphabetic)
        .into_iter()
        .filter(|t| t.chars().count() > 1)
        .collect();

    if tokens.is_empty() {
        return VocabularyAnalysis {
            estimated_level: CefrLevel::NotApplicable,
            lexical_diversity: 0.0,
            word_distribution: distribution([0; 4], 0),
            advanced_words: Vec::new(),
            complexity_score: 0.0,
        };
    }

    // Unique tokens in first-appearance order.
    let mut seen = HashSet::new();
    let unique: Vec<&String> = tokens.iter().filter(|t| seen.insert(t.as_str())).collect();

    let mut counts = [0u32; 4];
    let mut advanced_words = Vec::new();
    for word in &unique {
        let bucket = classify_word(word);
        counts[bucket_index(bucket)] += 1;
        if bucket == WordBucket::Advanced {
            advanced_words.push((*word).clone());
        }
    }
    let [elementary, intermediate, advanced, _] = counts;
    let classified = unique.len() as u32;

    let lexical_diversity = round2(unique.len() as f64 / tokens.len() as f64);
    let diversity_component = (lexical_diversity * 10.0).min(MAX_DIVERSITY_COMPONENT);
    let level_component = ((intermediate as f64 * 1.5 + advanced as f64 * 3.0)
        / classified as f64
        * 4.0)
        .min(MAX_LEVEL_COMPONENT);
    let complexity_score = round1((diversity_component + level_component).min(10.0));

    VocabularyAnalysis {
        estimated_level: estimate_level(elementary, intermediate, advanced),
        lexical_diversity,
        word_distribution: distribution(counts, classified),
        advanced_words,
        complexity_score,
    }
}

const BUCKETS: [WordBucket; 4] = [
    WordBucket::Elementary,
    WordBucket::Intermediate,
    WordBucket::Advanced,
    WordBucket::Other,
];

fn bucket_index(bucket: WordBucket) -> usize {
    match bucket {
        WordBucket::Elementary => 0,
        WordBucket::Intermediate => 1,
        WordBucket::Advanced => 2,
        WordBucket::Other => 3,
    }
}

fn distribution(counts: [u32; 4], classified: u32) -> Vec<BucketShare> {
    BUCKETS
        .into_iter()
        .zip(counts)
        .map(|(level, count)| BucketShare {
            level,
            count,
            percentage: if classified == 0 {
                0
            } else {
                (count as f64 / classified as f64 * 100.0).round() as u32
            },
        })
        .collect()
}
