//! 参数映射表
//!
//! 把通用参数名映射为各工具的专用参数名：先铺默认值，再按别名表改名，最后对缺失的必填参数做推断。
//! 未登记的工具原样透传。

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 缺失必填参数的推断规则
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Inference {
    /// 从第一个存在的来源参数复制
    CopyFrom { target: String, sources: Vec<String> },
    /// 若 when_present 存在则取固定值
    ValueIf {
        target: String,
        when_present: String,
        value: Value,
    },
}

impl Inference {
    fn target(&self) -> &str {
        match self {
            Self::CopyFrom { target, .. } | Self::ValueIf { target, .. } => target,
        }
    }

    fn apply(&self, params: &Map<String, Value>) -> Option<Value> {
        match self {
            Self::CopyFrom { sources, .. } => sources.iter().find_map(|s| params.get(s).cloned()),
            Self::ValueIf {
                when_present,
                value,
                ..
            } => params.contains_key(when_present).then(|| value.clone()),
        }
    }
}

/// 单个工具的参数规格
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolParamSpec {
    pub required: Vec<String>,
    /// 通用名 -> 工具专用名
    pub aliases: HashMap<String, String>,
    pub defaults: Map<String, Value>,
    pub inference: Vec<Inference>,
}

impl ToolParamSpec {
    fn new(required: &[&str]) -> Self {
        Self {
            required: required.iter().map(|s| s.to_string()).collect(),
            ..Self::default()
        }
    }

    fn alias(mut self, from: &str, to: &str) -> Self {
        self.aliases.insert(from.to_string(), to.to_string());
        self
    }

    fn default_value(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.defaults.insert(key.to_string(), value.into());
        self
    }

    fn copy_from(mut self, target: &str, sources: &[&str]) -> Self {
        self.inference.push(Inference::CopyFrom {
            target: target.to_string(),
            sources: sources.iter().map(|s| s.to_string()).collect(),
        });
        self
    }

    fn value_if(mut self, target: &str, when_present: &str, value: impl Into<Value>) -> Self {
        self.inference.push(Inference::ValueIf {
            target: target.to_string(),
            when_present: when_present.to_string(),
            value: value.into(),
        });
        self
    }
}

/// 参数映射器
#[derive(Debug, Clone)]
pub struct ParameterMapper {
    specs: HashMap<String, ToolParamSpec>,
}

impl Default for ParameterMapper {
    fn default() -> Self {
        let mut specs = HashMap::new();

        specs.insert(
            "file_manager".to_string(),
            ToolParamSpec::new(&["operation", "path"])
                .alias("action", "operation")
                .alias("file_path", "path")
                .alias("filepath", "path")
                .alias("filename", "path")
                .alias("directory", "path")
                .alias("dir", "path")
                .alias("text", "content")
                .alias("data", "content")
                .alias("file_content", "content")
                .alias("dest", "destination")
                .alias("target", "destination")
                .default_value("operation", "read")
                .default_value("encoding", "utf-8")
                .default_value("append", false)
                .value_if("operation", "content", "write")
                .value_if("operation", "path", "read")
                .copy_from("path", &["file", "filename"]),
        );

        specs.insert(
            "terminal_executor".to_string(),
            ToolParamSpec::new(&["command"])
                .alias("cmd", "command")
                .alias("shell_command", "command")
                .alias("bash_command", "command")
                .alias("script", "command")
                .alias("working_dir", "cwd")
                .alias("directory", "cwd")
                .alias("timeout_seconds", "timeout")
                .default_value("timeout", 30)
                .default_value("capture_output", true)
                .copy_from("command", &["script", "action"]),
        );

        specs.insert(
            "code_executor".to_string(),
            ToolParamSpec::new(&["code"])
                .alias("source_code", "code")
                .alias("script", "code")
                .alias("program", "code")
                .alias("lang", "language")
                .alias("programming_language", "language")
                .default_value("language", "python")
                .default_value("timeout", 30)
                .copy_from("code", &["script", "program"]),
        );

        specs.insert(
            "calculator".to_string(),
            ToolParamSpec::new(&["expression"])
                .alias("formula", "expression")
                .alias("calculation", "expression")
                .alias("math", "expression")
                .alias("equation", "expression")
                .copy_from("expression", &["math", "calculation"]),
        );

        specs.insert(
            "web_search".to_string(),
            ToolParamSpec::new(&["query"])
                .alias("search_term", "query")
                .alias("search_query", "query")
                .alias("keywords", "query")
                .alias("q", "query")
                .alias("max_results", "limit")
                .alias("num_results", "limit")
                .default_value("limit", 10)
                .copy_from("query", &["search", "keywords"]),
        );

        specs.insert(
            "human_input".to_string(),
            ToolParamSpec::new(&["prompt"])
                .alias("message", "prompt")
                .alias("question", "prompt")
                .alias("request", "prompt")
                .default_value("timeout", 300),
        );

        Self { specs }
    }
}

impl ParameterMapper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn empty() -> Self {
        Self {
            specs: HashMap::new(),
        }
    }

    /// 注册或替换一个工具的规格
    pub fn with_spec(mut self, tool: &str, spec: ToolParamSpec) -> Self {
        self.specs.insert(tool.to_string(), spec);
        self
    }

    pub fn spec(&self, tool: &str) -> Option<&ToolParamSpec> {
        self.specs.get(tool)
    }

    /// 映射参数；非对象参数与未登记工具原样返回
    pub fn map_parameters(&self, tool: &str, params: &Value) -> Value {
        let Some(spec) = self.specs.get(tool) else {
            tracing::warn!(tool, "No parameter mapping registered");
            return params.clone();
        };
        let source = match params {
            Value::Object(map) => map.clone(),
            Value::Null => Map::new(),
            other => return other.clone(),
        };

        let mut mapped = spec.defaults.clone();
        for (name, value) in source {
            let key = spec.aliases.get(&name).cloned().unwrap_or(name);
            mapped.insert(key, value);
        }

        let missing: Vec<&String> = spec.required.iter().filter(|r| !mapped.contains_key(*r)).collect();
        if !missing.is_empty() {
            tracing::warn!(tool, ?missing, "Missing required parameters, attempting inference");
            let mut inferred = Map::new();
            for target in missing {
                let value = spec
                    .inference
                    .iter()
                    .filter(|rule| rule.target() == target)
                    .find_map(|rule| rule.apply(&mapped));
                if let Some(value) = value {
                    inferred.insert(target.clone(), value);
                }
            }
            if !inferred.is_empty() {
                tracing::info!(tool, inferred = %serde_json::Value::Object(inferred.clone()), "Inferred parameters");
                mapped.extend(inferred);
            }
        }

        tracing::debug!(tool, mapped = %serde_json::Value::Object(mapped.clone()), "Mapped parameters");
        Value::Object(mapped)
    }

    /// 返回缺失的必填参数；未登记工具视为无约束
    pub fn validate_parameters(&self, tool: &str, params: &Value) -> Vec<String> {
        let Some(spec) = self.specs.get(tool) else {
            return Vec::new();
        };
        spec.required
            .iter()
            .filter(|r| params.get(r.as_str()).is_none())
            .cloned()
            .collect()
    }
}
