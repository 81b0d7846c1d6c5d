//! Configuration for the local llama.cpp subprocess back-end (`LLM_TYPE=local`).

#[derive(Debug, Clone)]
pub struct LocalLlmConfig {
    /// `LLAMA_PATH`
    pub llama_executable: String,
    /// `MODEL_PATH`
    pub model_path: String,
    pub threads: u32,
    pub gpu_layers: u32,
    pub ctx_size: u32,
    pub temperature: f32,
    pub timeout_secs: u64,
}

impl LocalLlmConfig {
    pub fn new(llama_executable: impl Into<String>, model_path: impl Into<String>) -> Self {
        Self {
            llama_executable: llama_executable.into(),
            model_path: model_path.into(),
            threads: 6,
            gpu_layers: 0,
            ctx_size: 4096,
            temperature: 0.2,
            timeout_secs: 120,
        }
    }

    pub fn with_threads(mut self, threads: u32) -> Self {
        self.threads = threads;
        self
    }

    pub fn with_ctx_size(mut self, ctx_size: u32) -> Self {
        self.ctx_size = ctx_size;
        self
    }

    pub fn with_gpu_layers(mut self, gpu_layers: u32) -> Self {
        self.gpu_layers = gpu_layers;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature.clamp(0.0, 1.0);
        self
    }
}
