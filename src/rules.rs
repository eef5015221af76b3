//! 关键词规则表
//!
//! 复杂度 / 任务类型 / 能力需求 / 失败分类 / 工具路由都是「有序的关键词集合 → 值」查表：
//! 按声明顺序做子串匹配，首个命中的规则获胜。规则以数据形式存在，可从 TOML 整体替换，
//! 不需要改动编排代码。

use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::core::EngineError;

/// 单条规则：任一关键词以子串形式出现在（小写后的）文本中即命中
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordRule<T> {
    pub keywords: Vec<String>,
    pub value: T,
}

impl<T> KeywordRule<T> {
    pub fn new(keywords: &[&str], value: T) -> Self {
        Self {
            keywords: keywords.iter().map(|k| k.to_lowercase()).collect(),
            value,
        }
    }

    /// text 需已转小写
    pub fn matches(&self, text: &str) -> bool {
        self.keywords.iter().any(|k| text.contains(k.as_str()))
    }
}

/// 有序规则表
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordTable<T> {
    pub rules: Vec<KeywordRule<T>>,
}

impl<T> Default for KeywordTable<T> {
    fn default() -> Self {
        Self { rules: Vec::new() }
    }
}

impl<T> KeywordTable<T> {
    pub fn new(rules: Vec<KeywordRule<T>>) -> Self {
        Self { rules }
    }

    /// 追加一条规则（优先级低于已有规则）
    pub fn rule(mut self, keywords: &[&str], value: T) -> Self {
        self.rules.push(KeywordRule::new(keywords, value));
        self
    }

    /// 首个命中规则的值
    pub fn first_match(&self, text: &str) -> Option<&T> {
        let lower = text.to_lowercase();
        self.rules.iter().find(|r| r.matches(&lower)).map(|r| &r.value)
    }

    /// 所有命中规则的值（按规则顺序）
    pub fn all_matches(&self, text: &str) -> Vec<&T> {
        let lower = text.to_lowercase();
        self.rules
            .iter()
            .filter(|r| r.matches(&lower))
            .map(|r| &r.value)
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl<T: DeserializeOwned> KeywordTable<T> {
    /// 从 TOML 文本加载：
    ///
    /// ```toml
    /// [[rules]]
    /// keywords = ["timeout", "network"]
    /// value = "transient"
    /// ```
    pub fn from_toml(src: &str) -> Result<Self, toml::de::Error> {
        let mut table: Self = toml::from_str(src)?;
        for rule in &mut table.rules {
            for k in &mut rule.keywords {
                *k = k.to_lowercase();
            }
        }
        Ok(table)
    }

    /// 读取规则文件；读不到为 Config 错误，内容不合法为 Rules 错误
    pub fn from_file(path: &Path) -> Result<Self, EngineError> {
        let src = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("cannot read rule table {}: {}", path.display(), e)))?;
        Ok(Self::from_toml(&src)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_match_respects_order() {
        let table = KeywordTable::default()
            .rule(&["invalid", "missing"], "configuration")
            .rule(&["invalid", "syntax"], "logic");
        assert_eq!(table.first_match("Invalid token"), Some(&"configuration"));
        assert_eq!(table.first_match("syntax error"), Some(&"logic"));
        assert_eq!(table.first_match("all good"), None);
    }

    #[test]
    fn test_all_matches_keeps_rule_order() {
        let table = KeywordTable::default()
            .rule(&["file"], "file_manager")
            .rule(&["search"], "web_search");
        let hits = table.all_matches("search the web and save to a file");
        assert_eq!(hits, vec![&"file_manager", &"web_search"]);
    }

    #[test]
    fn test_from_toml_lowercases_keywords() {
        let src = r#"
            [[rules]]
            keywords = ["TimeOut"]
            value = "transient"
        "#;
        let table: KeywordTable<String> = KeywordTable::from_toml(src).unwrap();
        assert_eq!(table.first_match("request timeout"), Some(&"transient".to_string()));
    }

    #[test]
    fn test_from_file_errors() {
        use std::io::Write;

        let missing = KeywordTable::<String>::from_file(Path::new("no/such/rules.toml")).unwrap_err();
        assert!(matches!(missing, EngineError::Config(ref msg) if msg.contains("no/such/rules.toml")));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[[rules]]\nkeywords = \"not a list\"\nvalue = \"x\"").unwrap();
        let invalid = KeywordTable::<String>::from_file(file.path()).unwrap_err();
        assert!(matches!(invalid, EngineError::Rules(_)));
        assert!(invalid.to_string().starts_with("Invalid rule table"));
    }
}
