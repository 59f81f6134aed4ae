use std::sync::Arc;

use sqlx::{PgPool, Row};
use tracing::instrument;
use uuid::Uuid;

use retailerp_core::MaterialId;
use retailerp_inventory::MaterialStock;

use super::MaterialStore;
use crate::inventory_store::StoreError;
use crate::pg;

#[derive(Debug, Clone)]
pub struct PostgresMaterialStore {
    pool: Arc<PgPool>,
}

impl PostgresMaterialStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Single-statement upsert: `GREATEST(stock + delta, 0)`.
    #[instrument(skip(self), fields(material_id = %material_id), err)]
    pub async fn apply_delta(
        &self,
        material_id: MaterialId,
        delta: i64,
    ) -> Result<MaterialStock, StoreError> {
        let quantity: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO material_stock (material_id, quantity)
            VALUES ($1, GREATEST($2, 0))
            ON CONFLICT (material_id) DO UPDATE
                SET quantity = GREATEST(material_stock.quantity + $2, 0)
            RETURNING quantity
            "#,
        )
        .bind(material_id.as_uuid())
        .bind(delta)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("sqlx error in apply_delta: {e}")))?;

        Ok(MaterialStock {
            material_id,
            quantity,
        })
    }

    pub async fn load(&self, material_id: Option<MaterialId>) -> Result<Vec<MaterialStock>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT material_id, quantity FROM material_stock
            WHERE ($1::uuid IS NULL OR material_id = $1)
            ORDER BY material_id
            "#,
        )
        .bind(material_id.map(Uuid::from))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("sqlx error in load_materials: {e}")))?;

        rows.iter()
            .map(|row| {
                let id: Uuid = row
                    .try_get("material_id")
                    .map_err(|e| StoreError::Storage(e.to_string()))?;
                let quantity: i64 = row
                    .try_get("quantity")
                    .map_err(|e| StoreError::Storage(e.to_string()))?;
                Ok(MaterialStock {
                    material_id: MaterialId::from_uuid(id),
                    quantity,
                })
            })
            .collect()
    }
}

impl MaterialStore for PostgresMaterialStore {
    fn quantity(&self, material_id: MaterialId) -> Result<i64, StoreError> {
        let stocks = pg::block_on(self.load(Some(material_id))).map_err(StoreError::Storage)??;
        Ok(stocks.first().map(|s| s.quantity).unwrap_or(0))
    }

    fn receive(&self, material_id: MaterialId, quantity: i64) -> Result<MaterialStock, StoreError> {
        if quantity <= 0 {
            return Err(StoreError::Storage(format!(
                "received material quantity must be positive, got {quantity}"
            )));
        }
        pg::block_on(self.apply_delta(material_id, quantity)).map_err(StoreError::Storage)?
    }

    fn consume(&self, material_id: MaterialId, quantity: i64) -> Result<MaterialStock, StoreError> {
        pg::block_on(self.apply_delta(material_id, -quantity.max(0))).map_err(StoreError::Storage)?
    }

    fn stocks(&self) -> Result<Vec<MaterialStock>, StoreError> {
        pg::block_on(self.load(None)).map_err(StoreError::Storage)?
    }
}
