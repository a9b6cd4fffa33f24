use std::collections::HashMap;
use std::path::Path;
use std::time::{Duration, Instant};

use parking_lot::RwLock;

use ck_domain::error::Result;
use ck_domain::model::{ConnectionState, SpecialistDescriptor};
use ck_knowledge::Embedder;
use ck_providers::classifier::{compute_centroid, cosine_similarity};

use crate::loader;

/// How long a message's embedding stays cached for routing. Short on
/// purpose: the registry is process-wide and a stale routing decision for
/// a popular exact-duplicate message is a correctness risk, not just a
/// perf one.
const ROUTE_CACHE_TTL: Duration = Duration::from_secs(120);

struct CachedRouteEmbedding {
    embedding: Vec<f32>,
    expires_at: Instant,
}

/// Process-wide catalogue of specialists, loaded once at start-up.
///
/// Each specialist's capability tags are embedded and averaged into a
/// centroid at load time. Routing embeds the incoming message and ranks
/// specialists by cosine similarity against those centroids, after
/// dropping specialists whose tool-requirements or connection
/// precondition the caller can't currently satisfy.
pub struct SpecialistRegistry {
    entries: Vec<SpecialistDescriptor>,
    centroids: HashMap<String, Vec<f32>>,
    route_cache: RwLock<HashMap<u64, CachedRouteEmbedding>>,
}

impl SpecialistRegistry {
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
            centroids: HashMap::new(),
            route_cache: RwLock::new(HashMap::new()),
        }
    }

    /// Scan `specialists_root` for manifests and embed each specialist's
    /// capability tags into a centroid. Makes one embedding call per tag
    /// per specialist against `embedder`.
    pub async fn load(specialists_root: &Path, embedder: &Embedder) -> Result<Self> {
        let entries = loader::scan_specialists(specialists_root)?;
        let mut centroids = HashMap::with_capacity(entries.len());

        for descriptor in &entries {
            let mut tag_vectors = Vec::with_capacity(descriptor.capabilities.len());
            for tag in &descriptor.capabilities {
                tag_vectors.push(embedder.embed(tag).await?);
            }
            if !tag_vectors.is_empty() {
                centroids.insert(descriptor.name.clone(), compute_centroid(&tag_vectors));
            }
        }

        tracing::info!(
            specialists_count = entries.len(),
            "specialist registry loaded"
        );

        Ok(Self {
            entries,
            centroids,
            route_cache: RwLock::new(HashMap::new()),
        })
    }

    pub fn list_capabilities(&self) -> &[SpecialistDescriptor] {
        &self.entries
    }

    pub fn lookup(&self, name: &str) -> Option<&SpecialistDescriptor> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// Rank specialists for `message`, dropping any whose tool
    /// requirements aren't satisfied by `available_tools` or whose
    /// connection precondition isn't `Connected`.
    ///
    /// The first element of the result is the primary specialist; the
    /// rest are pre-authorized fall-backs in descending relevance order.
    pub async fn route(
        &self,
        message: &str,
        available_tools: &[String],
        connection_states: &HashMap<String, ConnectionState>,
        embedder: &Embedder,
    ) -> Result<Vec<SpecialistDescriptor>> {
        let eligible: Vec<&SpecialistDescriptor> = self
            .entries
            .iter()
            .filter(|d| {
                d.tool_requirements
                    .iter()
                    .all(|req| available_tools.iter().any(|t| t == req))
            })
            .filter(|d| match &d.requires_connection {
                None => true,
                Some(conn) => matches!(
                    connection_states.get(conn),
                    Some(ConnectionState::Connected)
                ),
            })
            .collect();

        if eligible.is_empty() {
            return Ok(Vec::new());
        }

        let message_embedding = self.embed_message(message, embedder).await?;

        let mut scored: Vec<(f32, &SpecialistDescriptor)> = eligible
            .into_iter()
            .map(|d| {
                let score = self
                    .centroids
                    .get(&d.name)
                    .map(|c| cosine_similarity(&message_embedding, c))
                    .unwrap_or(0.0);
                (score, d)
            })
            .collect();

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        Ok(scored.into_iter().map(|(_, d)| d.clone()).collect())
    }

    async fn embed_message(&self, message: &str, embedder: &Embedder) -> Result<Vec<f32>> {
        let key = hash_message(message);

        {
            let cache = self.route_cache.read();
            if let Some(cached) = cache.get(&key) {
                if cached.expires_at > Instant::now() {
                    return Ok(cached.embedding.clone());
                }
            }
        }

        let embedding = embedder.embed(message).await?;

        let mut cache = self.route_cache.write();
        cache.insert(
            key,
            CachedRouteEmbedding {
                embedding: embedding.clone(),
                expires_at: Instant::now() + ROUTE_CACHE_TTL,
            },
        );
        Ok(embedding)
    }
}

fn hash_message(message: &str) -> u64 {
    use std::hash::{Hash, Hasher};
    let normalized = message.trim().to_lowercase();
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    normalized.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_finds_loaded_entry() {
        let registry = SpecialistRegistry {
            entries: vec![SpecialistDescriptor {
                name: "billing-team".into(),
                kind: ck_domain::model::SpecialistKind::Team,
                capabilities: vec!["invoices".into()],
                tool_requirements: vec![],
                model_hint: None,
                description: String::new(),
                requires_connection: None,
            }],
            centroids: HashMap::new(),
            route_cache: RwLock::new(HashMap::new()),
        };
        assert!(registry.lookup("billing-team").is_some());
        assert!(registry.lookup("unknown").is_none());
    }

    #[test]
    fn hash_message_is_case_and_whitespace_insensitive() {
        assert_eq!(hash_message("  Hello World "), hash_message("hello world"));
    }
}
