//! Typed view of the `email_templates` table over the persistence port

use std::sync::Arc;

use serde_json::{json, Value};
use uuid::Uuid;

use super::model::EmailTemplate;
use crate::model::{FormType, Modality};
use crate::persistence::{Filter, Persistence, PersistenceError};

pub const TEMPLATES_TABLE: &str = "email_templates";

#[derive(Clone)]
pub struct TemplateRepository {
    store: Arc<dyn Persistence>,
}

fn decode(row: Value) -> Result<EmailTemplate, PersistenceError> {
    serde_json::from_value(row)
        .map_err(|e| PersistenceError::Decode(format!("{}: {}", TEMPLATES_TABLE, e)))
}

impl TemplateRepository {
    pub fn new(store: Arc<dyn Persistence>) -> Self {
        Self { store }
    }

    async fn select(&self, filter: Filter) -> Result<Vec<EmailTemplate>, PersistenceError> {
        self.store
            .select(TEMPLATES_TABLE, &filter)
            .await?
            .into_iter()
            .map(decode)
            .collect()
    }

    async fn first(&self, filter: Filter) -> Result<Option<EmailTemplate>, PersistenceError> {
        Ok(self.select(filter.limit(1)).await?.into_iter().next())
    }

    /// Template by id, active or not
    pub async fn get(&self, id: Uuid) -> Result<Option<EmailTemplate>, PersistenceError> {
        self.first(Filter::new().eq("id", id.to_string())).await
    }

    pub async fn get_active(&self, id: Uuid) -> Result<Option<EmailTemplate>, PersistenceError> {
        self.first(Filter::new().eq("id", id.to_string()).eq("ativo", true))
            .await
    }

    /// Newest active template mapped to exactly `(form_type, modality)`
    pub async fn find_specific(
        &self,
        form_type: FormType,
        modality: Modality,
    ) -> Result<Option<EmailTemplate>, PersistenceError> {
        self.first(
            Filter::new()
                .eq("formulario", form_type.as_str())
                .eq("modalidade", modality.as_str())
                .eq("ativo", true)
                .order_desc("created_at"),
        )
        .await
    }

    /// Every active template claiming `(form_type, modality)`
    pub async fn find_mapped(
        &self,
        form_type: FormType,
        modality: Modality,
    ) -> Result<Vec<EmailTemplate>, PersistenceError> {
        self.select(
            Filter::new()
                .eq("formulario", form_type.as_str())
                .eq("modalidade", modality.as_str())
                .eq("ativo", true),
        )
        .await
    }

    pub async fn latest_active(&self) -> Result<Option<EmailTemplate>, PersistenceError> {
        self.first(Filter::new().eq("ativo", true).order_desc("created_at"))
            .await
    }

    pub async fn list(&self) -> Result<Vec<EmailTemplate>, PersistenceError> {
        self.select(Filter::new().order_desc("created_at")).await
    }

    /// Write (or clear, with `None`) the form/modality association
    pub async fn set_mapping(
        &self,
        id: Uuid,
        mapping: Option<(FormType, Modality)>,
    ) -> Result<(), PersistenceError> {
        let patch = match mapping {
            Some((form_type, modality)) => json!({
                "formulario": form_type.as_str(),
                "modalidade": modality.as_str(),
            }),
            None => json!({ "formulario": null, "modalidade": null }),
        };
        self.store
            .update(TEMPLATES_TABLE, &id.to_string(), patch)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::MemoryPersistence;

    #[tokio::test]
    async fn test_find_specific_prefers_newest_active() {
        let store = MemoryPersistence::new();
        let old = Uuid::new_v4();
        let new = Uuid::new_v4();
        let inactive = Uuid::new_v4();
        store
            .seed(
                TEMPLATES_TABLE,
                vec![
                    json!({"id": old, "nome": "a", "assunto": "s", "corpo": "b",
                           "formulario": "comply_edocs", "modalidade": "saas", "ativo": true,
                           "created_at": "2026-01-01T00:00:00Z"}),
                    json!({"id": new, "nome": "b", "assunto": "s", "corpo": "b",
                           "formulario": "comply_edocs", "modalidade": "saas", "ativo": true,
                           "created_at": "2026-02-01T00:00:00Z"}),
                    json!({"id": inactive, "nome": "c", "assunto": "s", "corpo": "b",
                           "formulario": "comply_edocs", "modalidade": "saas", "ativo": false,
                           "created_at": "2026-03-01T00:00:00Z"}),
                ],
            )
            .await;

        let repo = TemplateRepository::new(Arc::new(store));
        let found = repo
            .find_specific(FormType::ComplyEdocs, Modality::Saas)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, new);
        assert_eq!(
            repo.find_mapped(FormType::ComplyEdocs, Modality::Saas)
                .await
                .unwrap()
                .len(),
            2
        );
        assert!(repo.get_active(inactive).await.unwrap().is_none());
        assert!(repo.get(inactive).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_set_mapping_roundtrip() {
        let store = MemoryPersistence::new();
        let id = Uuid::new_v4();
        store
            .seed(
                TEMPLATES_TABLE,
                vec![json!({"id": id, "nome": "a", "assunto": "s", "corpo": "b", "ativo": true,
                            "created_at": "2026-01-01T00:00:00Z"})],
            )
            .await;
        let repo = TemplateRepository::new(Arc::new(store));

        repo.set_mapping(id, Some((FormType::ComplyFiscal, Modality::OnPremise)))
            .await
            .unwrap();
        let t = repo.get(id).await.unwrap().unwrap();
        assert!(t.is_mapped_to(FormType::ComplyFiscal, Modality::OnPremise));

        repo.set_mapping(id, None).await.unwrap();
        let t = repo.get(id).await.unwrap().unwrap();
        assert_eq!(t.form_type, None);
    }
}
