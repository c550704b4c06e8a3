//! 数据库查询操作

use crate::connection::DatabasePool;
use crate::models::*;
use retina_core::{Exam, ExamResult, NewExamResult, Result, ResultChanges, RetinaError, Severity};
use sqlx::Row;
use uuid::Uuid;

const RESULT_COLUMNS: &str = "r.id, r.exam_id, r.diagnosis, r.detailed_diagnosis, r.probability_dr, \
     r.probability_no_dr, r.class_predicted, r.recommendation, r.doctor_notes, r.ml_api_response, \
     r.is_auto_diagnosis, r.analyzed_at, r.created_at, r.updated_at";

fn db_error(e: sqlx::Error) -> RetinaError {
    RetinaError::Database(e.to_string())
}

/// 唯一约束冲突即表示该检查已有结果
fn insert_error(e: sqlx::Error, exam_id: Uuid) -> RetinaError {
    match &e {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            tracing::warn!("Unique constraint rejected second result for exam {}", exam_id);
            RetinaError::conflict(format!("Exam {} already has a result", exam_id))
        }
        _ => db_error(e),
    }
}

/// 数据库查询操作接口
pub struct DatabaseQueries<'a> {
    pool: &'a DatabasePool,
}

impl<'a> DatabaseQueries<'a> {
    pub fn new(pool: &'a DatabasePool) -> Self {
        Self { pool }
    }

    /// 创建数据库表
    pub async fn create_tables(&self) -> Result<()> {
        let pool = self.pool.pool();

        // 患者表归患者管理模块所有，这里只保证归属字段存在
        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS patients (
                id UUID PRIMARY KEY,
                user_id UUID NOT NULL,
                name VARCHAR(255) NOT NULL,
                created_at TIMESTAMP WITH TIME ZONE DEFAULT NOW(),
                updated_at TIMESTAMP WITH TIME ZONE DEFAULT NOW()
            )
        "#).execute(pool).await.map_err(db_error)?;

        // 创建检查表
        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS exams (
                id UUID PRIMARY KEY,
                patient_id UUID NOT NULL REFERENCES patients(id) ON DELETE CASCADE,
                exam_type VARCHAR(255) NOT NULL,
                description TEXT,
                image_path VARCHAR(1024),
                exam_date DATE NOT NULL,
                status VARCHAR(16) NOT NULL DEFAULT 'pending'
                    CHECK (status IN ('pending', 'completed', 'cancelled')),
                notes TEXT,
                deleted_at TIMESTAMP WITH TIME ZONE,
                created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
            )
        "#).execute(pool).await.map_err(db_error)?;

        // 创建结果表，exam_id 唯一约束是“每个检查至多一个结果”的最终保证
        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS exam_results (
                id UUID PRIMARY KEY,
                exam_id UUID NOT NULL UNIQUE REFERENCES exams(id) ON DELETE CASCADE,
                diagnosis VARCHAR(255),
                detailed_diagnosis VARCHAR(16)
                    CHECK (detailed_diagnosis IN ('no_dr', 'mild', 'moderate', 'severe', 'proliferate')),
                probability_dr DOUBLE PRECISION,
                probability_no_dr DOUBLE PRECISION,
                class_predicted INTEGER,
                recommendation TEXT,
                doctor_notes TEXT,
                ml_api_response TEXT,
                is_auto_diagnosis BOOLEAN NOT NULL DEFAULT FALSE,
                analyzed_at TIMESTAMP WITH TIME ZONE,
                created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
            )
        "#).execute(pool).await.map_err(db_error)?;

        // 创建索引以优化查询性能
        self.create_indexes().await?;

        tracing::info!("Database tables created successfully");
        Ok(())
    }

    /// 创建数据库索引
    async fn create_indexes(&self) -> Result<()> {
        let pool = self.pool.pool();

        let indexes = vec![
            "CREATE INDEX IF NOT EXISTS idx_patients_user_id ON patients(user_id)",
            "CREATE INDEX IF NOT EXISTS idx_exams_patient_id ON exams(patient_id)",
            "CREATE INDEX IF NOT EXISTS idx_exams_status ON exams(status)",
            "CREATE INDEX IF NOT EXISTS idx_exam_results_unclassified ON exam_results(id) WHERE detailed_diagnosis IS NULL",
        ];

        for index_sql in indexes {
            sqlx::query(index_sql)
                .execute(pool)
                .await
                .map_err(db_error)?;
        }

        tracing::info!("Database indexes created successfully");
        Ok(())
    }

    // ========== 患者相关操作 ==========

    /// 查询患者所属用户
    pub async fn get_patient_owner(&self, patient_id: &Uuid) -> Result<Option<Uuid>> {
        let pool = self.pool.pool();

        let row = sqlx::query("SELECT user_id FROM patients WHERE id = $1")
            .bind(patient_id)
            .fetch_optional(pool)
            .await
            .map_err(db_error)?;

        Ok(row.map(|row| row.get("user_id")))
    }

    // ========== 检查相关操作 ==========

    /// 根据ID查找未删除的检查
    pub async fn get_exam_by_id(&self, id: &Uuid) -> Result<Option<Exam>> {
        let pool = self.pool.pool();

        let result = sqlx::query_as::<_, DbExam>(
            "SELECT * FROM exams WHERE id = $1 AND deleted_at IS NULL"
        )
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(db_error)?;

        Ok(result.map(Exam::from))
    }

    // ========== 结果相关操作 ==========

    /// 根据ID查找结果
    pub async fn get_result_by_id(&self, id: &Uuid) -> Result<Option<ExamResult>> {
        let pool = self.pool.pool();

        let result = sqlx::query_as::<_, DbExamResult>(
            "SELECT * FROM exam_results WHERE id = $1"
        )
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(db_error)?;

        Ok(result.map(ExamResult::from))
    }

    /// 根据检查ID查找结果
    pub async fn get_result_by_exam_id(&self, exam_id: &Uuid) -> Result<Option<ExamResult>> {
        let pool = self.pool.pool();

        let result = sqlx::query_as::<_, DbExamResult>(
            "SELECT * FROM exam_results WHERE exam_id = $1"
        )
        .bind(exam_id)
        .fetch_optional(pool)
        .await
        .map_err(db_error)?;

        Ok(result.map(ExamResult::from))
    }

    /// 插入结果并将检查置为 completed（同一事务）
    pub async fn create_result(&self, new_result: &NewExamResult) -> Result<ExamResult> {
        let mut tx = self.pool.pool().begin().await.map_err(db_error)?;

        let raw = new_result
            .raw_response
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let row = sqlx::query_as::<_, DbExamResult>(r#"
            INSERT INTO exam_results (id, exam_id, diagnosis, detailed_diagnosis, probability_dr,
                probability_no_dr, class_predicted, recommendation, doctor_notes, ml_api_response,
                is_auto_diagnosis, analyzed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING *
        "#)
        .bind(Uuid::new_v4())
        .bind(new_result.exam_id)
        .bind(new_result.diagnosis.as_str())
        .bind(new_result.detailed_diagnosis.map(|s| s.as_str()))
        .bind(new_result.probability_dr)
        .bind(new_result.probability_no_dr)
        .bind(new_result.class_predicted)
        .bind(&new_result.recommendation)
        .bind(&new_result.doctor_notes)
        .bind(raw)
        .bind(new_result.is_auto_diagnosis)
        .bind(new_result.analyzed_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| insert_error(e, new_result.exam_id))?;

        sqlx::query("UPDATE exams SET status = 'completed', updated_at = NOW() WHERE id = $1")
            .bind(new_result.exam_id)
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;

        tx.commit().await.map_err(db_error)?;
        Ok(ExamResult::from(row))
    }

    /// 部分更新结果
    ///
    /// 未提供的字段保持原值；可为空的列带一个“是否写入”标志，使显式的 null 能清空该列
    pub async fn update_result(&self, id: &Uuid, changes: &ResultChanges) -> Result<Option<ExamResult>> {
        let pool = self.pool.pool();

        let result = sqlx::query_as::<_, DbExamResult>(r#"
            UPDATE exam_results SET
                diagnosis = COALESCE($2, diagnosis),
                detailed_diagnosis = COALESCE($3, detailed_diagnosis),
                probability_dr = CASE WHEN $4 THEN $5 ELSE probability_dr END,
                probability_no_dr = CASE WHEN $6 THEN $7 ELSE probability_no_dr END,
                class_predicted = CASE WHEN $8 THEN $9 ELSE class_predicted END,
                recommendation = COALESCE($10, recommendation),
                doctor_notes = CASE WHEN $11 THEN $12 ELSE doctor_notes END,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
        "#)
        .bind(id)
        .bind(changes.diagnosis.map(|d| d.as_str()))
        .bind(changes.detailed_diagnosis.map(|s| s.as_str()))
        .bind(changes.probability_dr.is_some())
        .bind(changes.probability_dr.flatten())
        .bind(changes.probability_no_dr.is_some())
        .bind(changes.probability_no_dr.flatten())
        .bind(changes.class_predicted.is_some())
        .bind(changes.class_predicted.flatten())
        .bind(&changes.recommendation)
        .bind(changes.doctor_notes.is_some())
        .bind(changes.doctor_notes.clone().flatten())
        .fetch_optional(pool)
        .await
        .map_err(db_error)?;

        Ok(result.map(ExamResult::from))
    }

    /// 删除结果并把父检查回退为 pending（同一事务）
    pub async fn delete_result(&self, id: &Uuid) -> Result<Option<Exam>> {
        let mut tx = self.pool.pool().begin().await.map_err(db_error)?;

        let deleted = sqlx::query("DELETE FROM exam_results WHERE id = $1 RETURNING exam_id")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_error)?;

        let Some(row) = deleted else {
            return Ok(None);
        };
        let exam_id: Uuid = row.get("exam_id");

        let exam = sqlx::query_as::<_, DbExam>(
            "UPDATE exams SET status = 'pending', updated_at = NOW() WHERE id = $1 RETURNING *"
        )
        .bind(exam_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_error)?;

        tx.commit().await.map_err(db_error)?;
        Ok(Some(Exam::from(exam)))
    }

    /// 某用户名下的全部结果
    pub async fn get_results_by_owner(&self, owner_id: &Uuid, unclassified_only: bool) -> Result<Vec<ExamResult>> {
        let pool = self.pool.pool();

        let sql = format!(
            "SELECT {} FROM exam_results r \
             JOIN exams e ON e.id = r.exam_id \
             JOIN patients p ON p.id = e.patient_id \
             WHERE p.user_id = $1 AND e.deleted_at IS NULL {} \
             ORDER BY r.created_at DESC",
            RESULT_COLUMNS,
            if unclassified_only { "AND r.detailed_diagnosis IS NULL" } else { "" },
        );

        let results = sqlx::query_as::<_, DbExamResult>(&sql)
            .bind(owner_id)
            .fetch_all(pool)
            .await
            .map_err(db_error)?;

        Ok(results.into_iter().map(ExamResult::from).collect())
    }

    /// 写入分级诊断
    pub async fn update_detailed_diagnosis(&self, id: &Uuid, severity: Severity) -> Result<()> {
        let pool = self.pool.pool();

        sqlx::query(
            "UPDATE exam_results SET detailed_diagnosis = $1, updated_at = NOW() WHERE id = $2"
        )
        .bind(severity.as_str())
        .bind(id)
        .execute(pool)
        .await
        .map_err(db_error)?;

        Ok(())
    }
}
