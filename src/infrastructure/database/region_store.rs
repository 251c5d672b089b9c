use csv::ReaderBuilder;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{Column, Row};
use std::path::Path;
use tracing::{debug, info, warn};

use crate::business::domain::RegionRecord;
use crate::infrastructure::config::RegionConfig;
use crate::shared::constants::regions::{
    LEGACY_TABLE_NAME, PRIMARY_FIELD, SEAT_FIELD, TABLE_NAME,
};
use crate::shared::utils::normalize_column_name;
use crate::shared::{AppError, AppResult};

/// 地区参考数据存储（SQLite）
#[derive(Debug, Clone)]
pub struct RegionStore {
    pool: SqlitePool,
}

impl RegionStore {
    /// 打开数据库文件，不存在时创建
    pub async fn open(db_path: impl AsRef<Path>) -> AppResult<Self> {
        let options = SqliteConnectOptions::new()
            .filename(db_path.as_ref())
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        debug!("🗄️ 已打开参考数据库: {}", db_path.as_ref().display());
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// 将CSV导入 regions 表，返回导入的行数
    ///
    /// 所有列按文本存储，列名规范化；同名列只保留第一列。
    pub async fn import_csv(&self, csv_path: impl AsRef<Path>) -> AppResult<usize> {
        let csv_path = csv_path.as_ref();
        let mut reader = ReaderBuilder::new()
            .flexible(true)
            .from_path(csv_path)
            .map_err(|e| AppError::Internal(format!("读取CSV失败 {}: {}", csv_path.display(), e)))?;

        let headers = reader
            .headers()
            .map_err(|e| AppError::Internal(format!("读取CSV表头失败: {}", e)))?
            .clone();

        // (列在CSV中的位置, 规范化列名)
        let mut columns: Vec<(usize, String)> = Vec::new();
        for (index, header) in headers.iter().enumerate() {
            let mut name = normalize_column_name(header);
            if name.is_empty() {
                name = format!("COLUMN_{}", index + 1);
            }
            if columns.iter().any(|(_, existing)| existing == &name) {
                warn!("⚠️ CSV列名重复，忽略: {}", name);
                continue;
            }
            columns.push((index, name));
        }

        if columns.is_empty() {
            return Err(AppError::Configuration(format!(
                "CSV没有任何列: {}",
                csv_path.display()
            )));
        }
        for required in [PRIMARY_FIELD, SEAT_FIELD] {
            if columns.iter().all(|(_, name)| name != required) {
                warn!("⚠️ CSV中缺少列 {}", required);
            }
        }

        let column_list = columns
            .iter()
            .map(|(_, name)| quote_identifier(name))
            .collect::<Vec<_>>();
        let placeholders = vec!["?"; columns.len()].join(", ");
        let table = quote_identifier(TABLE_NAME);

        let mut tx = self.pool.begin().await?;

        sqlx::query(&format!("DROP TABLE IF EXISTS {}", table))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!(
            "CREATE TABLE {} ({})",
            table,
            column_list
                .iter()
                .map(|column| format!("{} TEXT", column))
                .collect::<Vec<_>>()
                .join(", ")
        ))
        .execute(&mut *tx)
        .await?;

        let insert = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table,
            column_list.join(", "),
            placeholders
        );

        let mut imported = 0;
        for (line, record) in reader.records().enumerate() {
            let record = record
                .map_err(|e| AppError::Internal(format!("CSV第 {} 行解析失败: {}", line + 2, e)))?;

            let mut query = sqlx::query(&insert);
            for (index, _) in &columns {
                query = query.bind(record.get(*index).unwrap_or_default().to_string());
            }
            query.execute(&mut *tx).await?;
            imported += 1;
        }

        tx.commit().await?;
        info!("✅ CSV导入完成: {} 行, {} 列", imported, columns.len());
        Ok(imported)
    }

    /// 按插入顺序读取全部记录
    ///
    /// 优先读取 regions 表，不存在时读取旧版的 municipios 表，都不存在时返回空列表。
    pub async fn load_records(&self) -> AppResult<Vec<RegionRecord>> {
        let table = match self.find_table().await? {
            Some(table) => table,
            None => {
                warn!("⚠️ 参考数据表 {} 不存在", TABLE_NAME);
                return Ok(Vec::new());
            }
        };
        if table != TABLE_NAME {
            warn!("⚠️ 使用旧版参考数据表 {}", table);
        }

        let rows = sqlx::query(&format!(
            "SELECT * FROM {} ORDER BY rowid",
            quote_identifier(table)
        ))
        .fetch_all(&self.pool)
        .await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let mut fields = Vec::with_capacity(row.columns().len());
            for column in row.columns() {
                let value: Option<String> = row.try_get(column.ordinal())?;
                fields.push((column.name().to_string(), value.unwrap_or_default()));
            }
            records.push(RegionRecord::new(fields));
        }

        Ok(records)
    }

    async fn find_table(&self) -> AppResult<Option<&'static str>> {
        for table in [TABLE_NAME, LEGACY_TABLE_NAME] {
            let exists: Option<String> = sqlx::query_scalar(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?",
            )
            .bind(table)
            .fetch_optional(&self.pool)
            .await?;
            if exists.is_some() {
                return Ok(Some(table));
            }
        }
        Ok(None)
    }
}

/// 加载地区参考数据
///
/// 数据库文件已存在时直接读取；否则从CSV导入后读取；CSV也不存在时返回空表。
pub async fn load_reference_data(config: &RegionConfig) -> AppResult<Vec<RegionRecord>> {
    let db_path = Path::new(&config.db_path);
    let csv_path = Path::new(&config.csv_path);

    let store = if db_path.exists() {
        info!("🗄️ 数据库 {} 已存在，跳过CSV导入", db_path.display());
        RegionStore::open(db_path).await?
    } else if csv_path.exists() {
        info!("📥 从CSV创建参考数据库: {} → {}", csv_path.display(), db_path.display());
        let store = RegionStore::open(db_path).await?;
        if let Err(e) = store.import_csv(csv_path).await {
            // 导入失败时删除半成品，下次启动重新导入
            store.pool().close().await;
            let _ = tokio::fs::remove_file(db_path).await;
            return Err(e);
        }
        store
    } else {
        warn!("⚠️ 地区CSV不存在: {}，地区识别不可用", csv_path.display());
        return Ok(Vec::new());
    };

    let records = store.load_records().await?;
    store.pool().close().await;
    info!("📍 已加载 {} 条地区记录", records.len());
    Ok(records)
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
