use super::Config;

impl Config {
    pub(crate) fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("LAMP_LLM_PROVIDER") {
            if let Ok(kind) = serde_json::from_value(serde_json::Value::String(v.clone())) {
                self.llm.provider = kind;
            } else {
                tracing::warn!("ignoring invalid LAMP_LLM_PROVIDER value: {v}");
            }
        }
        if let Ok(v) = std::env::var("LAMP_EMBEDDING_MODEL") {
            self.llm.embedding_model = v;
        }
        if let Ok(v) = std::env::var("LAMP_DEVICE") {
            self.llm.device = v;
        }
        if let Ok(v) = std::env::var("LAMP_INDEX_PATH") {
            self.index.path = v;
        }
        if let Ok(v) = std::env::var("LAMP_NUM_RETRIEVED_DOCS")
            && let Ok(n) = v.parse::<usize>()
        {
            self.retrieval.num_retrieved_docs = n;
        }
        if let Ok(v) = std::env::var("LAMP_NUM_DOCS_FINAL")
            && let Ok(n) = v.parse::<usize>()
        {
            self.retrieval.num_docs_final = n;
        }
        if let Ok(v) = std::env::var("LAMP_RERANKER_MODEL") {
            let v = v.trim();
            self.retrieval.reranker = (!v.is_empty()).then(|| v.to_owned());
        }
        if let Ok(v) = std::env::var("LAMP_GATEWAY_PORT")
            && let Ok(port) = v.parse::<u16>()
        {
            self.gateway.port = port;
        }
        if let Ok(v) = std::env::var("LAMP_GATEWAY_TOKEN") {
            self.gateway.auth_token = Some(v);
        }
    }
}
