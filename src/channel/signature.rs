use serde_json::{Map, Value};
use xxhash_rust::xxh64::xxh64;

use super::Event;

/// Сигнатура события для приближённого сопоставления похожести.
///
/// Имя события и отсортированный набор имён полей хэшируются точно;
/// полезная нагрузка сворачивается в SimHash по огрублённым классам
/// значений полей. Дистанция Хэмминга между хэшами нагрузок растёт
/// с долей полей, ушедших в другой класс. Это именно похожесть, не
/// идентичность: события одной структуры с близкими числами дают
/// дистанцию 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventSignature {
    name_hash: u64,
    fields_hash: u64,
    payload_hash: u64,
}

impl EventSignature {
    pub fn of(event: &Event) -> Self {
        // Map отсортирован по ключам, порядок полей стабилен.
        let fields = event
            .payload
            .keys()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("\u{1f}");

        Self {
            name_hash: xxh64(event.name.as_bytes(), 0),
            fields_hash: xxh64(fields.as_bytes(), 0),
            payload_hash: coarse_payload_hash(&event.payload),
        }
    }

    /// Похожи ли две сигнатуры.
    ///
    /// Имя и набор полей должны совпадать точно; SimHash-хэши
    /// нагрузок сравниваются по дистанции Хэмминга с настраиваемым
    /// порогом в битах. Сравнение O(1), так что поиск по окну
    /// остаётся O(размера окна).
    pub fn similar(
        &self,
        other: &EventSignature,
        threshold_bits: u32,
    ) -> bool {
        self.name_hash == other.name_hash
            && self.fields_hash == other.fields_hash
            && (self.payload_hash ^ other.payload_hash).count_ones() <= threshold_bits
    }
}

/// SimHash нагрузки: каждое поле голосует битами хэша своей пары
/// (имя, класс значения). Порядок полей на результат не влияет.
fn coarse_payload_hash(payload: &Map<String, Value>) -> u64 {
    let mut votes = [0i32; 64];
    for (key, value) in payload {
        let feature = xxh64(
            &coarse_token(value).to_le_bytes(),
            xxh64(key.as_bytes(), 0),
        );
        for (bit, vote) in votes.iter_mut().enumerate() {
            if feature >> bit & 1 == 1 {
                *vote += 1;
            } else {
                *vote -= 1;
            }
        }
    }
    votes.iter().enumerate().fold(
        0u64,
        |hash, (bit, vote)| {
            if *vote > 0 {
                hash | 1 << bit
            } else {
                hash
            }
        },
    )
}

/// Класс значения поля.
///
/// Числа огрубляются до знака, десятичного порядка и ведущей цифры:
/// 91 и 97 попадают в один класс, 9 и 91 — в разные. Строки и
/// вложенные структуры сравниваются точно: текстовое расхождение —
/// содержательное различие, а не шум измерения.
fn coarse_token(value: &Value) -> u64 {
    match value {
        Value::Null => xxh64(b"null", 1),
        Value::Bool(b) => xxh64(&[u8::from(*b)], 2),
        Value::Number(n) => {
            let v = n.as_f64().unwrap_or(0.0);
            if !v.is_finite() || v == 0.0 {
                return xxh64(b"zero", 3);
            }
            let magnitude = v.abs();
            let mut exponent = magnitude.log10().floor() as i64;
            let mut lead = (magnitude / 10f64.powi(exponent as i32)) as u8;
            // Плавающая точка на границах декад может дать 0 или 10.
            if lead == 0 {
                lead = 9;
                exponent -= 1;
            } else if lead >= 10 {
                lead = 1;
                exponent += 1;
            }
            let mut bytes = [0u8; 10];
            bytes[0] = u8::from(v < 0.0);
            bytes[1..9].copy_from_slice(&exponent.to_le_bytes());
            bytes[9] = lead;
            xxh64(&bytes, 4)
        }
        Value::String(s) => xxh64(s.as_bytes(), 5),
        Value::Array(_) | Value::Object(_) => xxh64(
            serde_json::to_string(value).unwrap_or_default().as_bytes(),
            6,
        ),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Map, Value};

    use super::*;

    fn event(name: &str, fields: &[(&str, i64)]) -> Event {
        let mut payload = Map::new();
        for (k, v) in fields {
            payload.insert((*k).to_string(), Value::from(*v));
        }
        Event::new(name, payload)
    }

    /// Тест проверяет, что сигнатура детерминирована.
    #[test]
    fn test_signature_is_deterministic() {
        let a = event("cpu_high", &[("load", 93), ("core", 2)]);
        assert_eq!(EventSignature::of(&a), EventSignature::of(&a));
    }

    /// Тест проверяет, что идентичные события похожи при нулевом
    /// пороге.
    #[test]
    fn test_identical_events_similar_at_zero_threshold() {
        let a = event("cpu_high", &[("load", 93)]);
        let b = event("cpu_high", &[("load", 93)]);
        assert!(EventSignature::of(&a).similar(&EventSignature::of(&b), 0));
    }

    /// Тест проверяет, что близкие числовые значения дают совпадение:
    /// один знак, порядок и ведущая цифра — один класс.
    #[test]
    fn test_nearby_numbers_similar() {
        let a = event("cpu_high", &[("load", 91)]);
        let b = event("cpu_high", &[("load", 97)]);
        assert!(EventSignature::of(&a).similar(&EventSignature::of(&b), 8));

        let c = Event::new("disk", {
            let mut m = Map::new();
            m.insert("usage".to_string(), json!(0.91));
            m
        });
        let d = Event::new("disk", {
            let mut m = Map::new();
            m.insert("usage".to_string(), json!(0.97));
            m
        });
        assert!(EventSignature::of(&c).similar(&EventSignature::of(&d), 8));
    }

    /// Тест проверяет, что далёкие по порядку значения не совпадают
    /// при пороге по умолчанию.
    #[test]
    fn test_distant_numbers_not_similar() {
        let a = event("cpu_high", &[("load", 9)]);
        let b = event("cpu_high", &[("load", 9_000)]);
        assert!(!EventSignature::of(&a).similar(&EventSignature::of(&b), 8));
    }

    /// Тест проверяет, что разные имена никогда не совпадают,
    /// каким бы большим ни был порог.
    #[test]
    fn test_different_names_never_similar() {
        let a = event("cpu_high", &[("load", 93)]);
        let b = event("mem_high", &[("load", 93)]);
        assert!(!EventSignature::of(&a).similar(&EventSignature::of(&b), 64));
    }

    /// Тест проверяет, что различающийся набор полей исключает
    /// совпадение.
    #[test]
    fn test_different_field_sets_never_similar() {
        let a = event("cpu_high", &[("load", 93)]);
        let b = event("cpu_high", &[("load", 93), ("core", 1)]);
        assert!(!EventSignature::of(&a).similar(&EventSignature::of(&b), 64));
    }

    /// Тест проверяет, что порядок вставки полей не влияет на
    /// сигнатуру (Map сортирует ключи).
    #[test]
    fn test_field_insertion_order_is_irrelevant() {
        let a = event("e", &[("a", 1), ("b", 2)]);
        let b = event("e", &[("b", 2), ("a", 1)]);
        assert_eq!(EventSignature::of(&a), EventSignature::of(&b));
    }
}
