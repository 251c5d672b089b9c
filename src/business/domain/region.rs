//! 地区参考记录

use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::shared::constants::regions::{LOCALITIES_FIELD, PRIMARY_FIELD, SEAT_FIELD};
use crate::shared::utils::normalize_column_name;

/// 上下文中优先展示的字段
const LEADING_FIELDS: &[(&str, &str)] = &[
    ("DEPENDENCIA", "Dependencia"),
    ("DIRECCION", "Dirección"),
];

/// 其余展示字段（按顺序）
const TRAILING_FIELDS: &[(&str, &str)] = &[
    ("TELEFONO", "Teléfono"),
    ("WHATSAPP", "WhatsApp"),
    ("HORARIO", "Horario"),
    ("EMAIL", "Email"),
    ("LOCALIDADES", "Localidades"),
    ("CABECERA", "Cabecera"),
];

/// 一条地区记录：规范化字段名 → 字符串值，保持加载顺序
///
/// 加载后不可变，在所有请求之间只读共享。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionRecord {
    fields: Vec<(String, String)>,
}

impl RegionRecord {
    /// 从原始列名/取值构建记录，列名在此处规范化
    pub fn new<I, K, V>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut normalized: Vec<(String, String)> = Vec::new();
        for (key, value) in fields {
            let key = normalize_column_name(key.as_ref());
            let value = value.into();
            // 同名列保留第一次出现的值
            if normalized.iter().all(|(existing, _)| existing != &key) {
                normalized.push((key, value));
            }
        }
        Self { fields: normalized }
    }

    /// 按字段名读取（字段名需已规范化）
    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(key, _)| key == field)
            .map(|(_, value)| value.as_str())
    }

    /// 字段按加载顺序迭代
    pub fn fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn primary_name(&self) -> Option<&str> {
        self.get(PRIMARY_FIELD).filter(|v| !v.trim().is_empty())
    }

    /// 记录的展示名称：主名称，其次任何名称类字段，再次第一个非空值
    pub fn display_name(&self) -> &str {
        if let Some(name) = self.primary_name() {
            return name;
        }
        self.fields
            .iter()
            .find(|(key, value)| {
                !value.trim().is_empty()
                    && (key.contains("MUNICIP") || key.contains("NOMBRE") || key.contains("LOCALIDAD"))
            })
            .or_else(|| self.fields.iter().find(|(_, value)| !value.trim().is_empty()))
            .map(|(_, value)| value.as_str())
            .unwrap_or("Desconocido")
    }

    /// 可检索字段取值：主名称、逐个子地区、首府
    pub fn searchable_values(&self) -> Vec<&str> {
        let mut values = Vec::new();
        if let Some(primary) = self.get(PRIMARY_FIELD) {
            values.push(primary.trim());
        }
        if let Some(localities) = self.get(LOCALITIES_FIELD) {
            values.extend(localities.split(',').map(str::trim));
        }
        if let Some(seat) = self.get(SEAT_FIELD) {
            values.push(seat.trim());
        }
        values.retain(|value| !value.is_empty());
        values
    }

    /// 渲染为发送给推理后端的上下文文本
    pub fn context_block(&self) -> String {
        let mut lines = vec![format!(
            "**Información de la oficina en {}:**\n",
            self.display_name()
        )];

        for (key, label) in LEADING_FIELDS.iter().chain(TRAILING_FIELDS.iter()) {
            if let Some(value) = self.get(key).filter(|v| !v.trim().is_empty()) {
                lines.push(format!("**{}:** {}", label, value.trim()));
            }
        }

        lines.join("\n").trim().to_string()
    }
}

impl Serialize for RegionRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (key, value) in &self.fields {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}
