pub mod models;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

use crate::content::ReviewStatus;

#[derive(Debug, Clone)]
pub struct Database {
    pub pool: PgPool,
}

/// Assistant turn ready for persistence, as produced by the dispatcher.
#[derive(Debug, Clone)]
pub struct NewAssistantMessage {
    pub content: String,
    pub model_used: String,
    pub temperature: Option<f64>,
    pub max_tokens: Option<i32>,
    pub prompt_tokens: Option<i32>,
    pub completion_tokens: Option<i32>,
    pub total_tokens: Option<i32>,
}

#[derive(Debug, Clone)]
pub struct NewAttachment {
    pub name: String,
    pub path: String,
    pub mimetype: String,
    pub size_bytes: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct NewGeneratedContent {
    pub user_id: String,
    pub content_type: String,
    pub prompt: String,
    pub model_used: String,
    pub content_data: Option<String>,
    pub file_path: Option<String>,
    pub temperature: Option<f64>,
    pub style: Option<String>,
    pub ratio: Option<String>,
    pub duration: Option<i32>,
}

impl Database {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub async fn run_migrations(&self) -> anyhow::Result<()> {
        // Each CREATE TABLE must be a separate query (Postgres doesn't allow
        // multiple commands in a single prepared statement).

        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS plans (
                id SERIAL PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )"#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS features (
                id SERIAL PRIMARY KEY,
                key TEXT NOT NULL UNIQUE,
                description TEXT,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )"#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS plan_features (
                id SERIAL PRIMARY KEY,
                plan_id INT NOT NULL REFERENCES plans(id) ON DELETE CASCADE,
                feature_id INT NOT NULL REFERENCES features(id) ON DELETE CASCADE,
                value TEXT NOT NULL DEFAULT 'false',
                UNIQUE (plan_id, feature_id)
            )"#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                full_name TEXT NOT NULL,
                username TEXT NOT NULL UNIQUE,
                email TEXT NOT NULL UNIQUE,
                password TEXT NOT NULL,
                role TEXT NOT NULL DEFAULT 'user',
                is_active BOOLEAN NOT NULL DEFAULT TRUE,
                plan_id INT REFERENCES plans(id),
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )"#,
        )
        .execute(&self.pool)
        .await?;

        // The unique constraint is what serializes concurrent get-or-create
        // calls for the same (user, month).
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS monthly_usage (
                id SERIAL PRIMARY KEY,
                user_id TEXT NOT NULL REFERENCES users(id),
                month_key VARCHAR(7) NOT NULL,
                used_messages INT NOT NULL DEFAULT 0,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                CONSTRAINT uq_monthly_usage_user_month UNIQUE (user_id, month_key)
            )"#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS chats (
                id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                user_id TEXT NOT NULL REFERENCES users(id),
                title TEXT NOT NULL DEFAULT 'Novo Chat',
                system_prompt TEXT,
                default_model TEXT,
                supports_vision BOOLEAN NOT NULL DEFAULT FALSE,
                archived BOOLEAN NOT NULL DEFAULT FALSE,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )"#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS chat_messages (
                id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                chat_id UUID NOT NULL REFERENCES chats(id) ON DELETE CASCADE,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                model_used TEXT,
                temperature DOUBLE PRECISION,
                max_tokens INT,
                prompt_tokens INT,
                completion_tokens INT,
                total_tokens INT,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )"#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS chat_attachments (
                id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                message_id UUID NOT NULL REFERENCES chat_messages(id) ON DELETE CASCADE,
                name TEXT NOT NULL,
                path TEXT NOT NULL,
                mimetype TEXT NOT NULL,
                size_bytes BIGINT,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )"#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS projects (
                id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                user_id TEXT NOT NULL REFERENCES users(id),
                name TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )"#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS generated_contents (
                id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                user_id TEXT NOT NULL REFERENCES users(id),
                content_type TEXT NOT NULL,
                prompt TEXT NOT NULL,
                model_used TEXT NOT NULL,
                content_data TEXT,
                file_path TEXT,
                temperature DOUBLE PRECISION,
                style TEXT,
                ratio TEXT,
                duration INT,
                status TEXT NOT NULL DEFAULT 'draft',
                submitted_at TIMESTAMPTZ,
                submitted_by TEXT,
                approved_at TIMESTAMPTZ,
                approved_by TEXT,
                rejected_at TIMESTAMPTZ,
                rejected_by TEXT,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )"#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS project_contents (
                project_id UUID NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
                content_id UUID NOT NULL REFERENCES generated_contents(id) ON DELETE CASCADE,
                PRIMARY KEY (project_id, content_id)
            )"#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_messages_chat ON chat_messages(chat_id, created_at)")
            .execute(&self.pool)
            .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_chats_user ON chats(user_id, updated_at DESC)")
            .execute(&self.pool)
            .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_usage_user_month ON monthly_usage(user_id, month_key)")
            .execute(&self.pool)
            .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_contents_user ON generated_contents(user_id, created_at DESC)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    // ── User Operations ────────────────────────────────────────────

    pub async fn create_user(
        &self,
        full_name: &str,
        username: &str,
        email: &str,
        password: &str,
        plan_id: Option<i32>,
    ) -> anyhow::Result<models::User> {
        let user = sqlx::query_as::<_, models::User>(
            r#"
            INSERT INTO users (id, full_name, username, email, password, plan_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(full_name)
        .bind(username)
        .bind(email)
        .bind(password)
        .bind(plan_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(user)
    }

    pub async fn get_user(&self, user_id: &str) -> anyhow::Result<Option<models::User>> {
        let user = sqlx::query_as::<_, models::User>("SELECT * FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    pub async fn assign_plan(&self, user_id: &str, plan_id: i32) -> anyhow::Result<()> {
        sqlx::query("UPDATE users SET plan_id = $2 WHERE id = $1")
            .bind(user_id)
            .bind(plan_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ── Plan / Feature Operations ──────────────────────────────────

    pub async fn get_or_create_plan(&self, name: &str) -> anyhow::Result<models::Plan> {
        let plan = sqlx::query_as::<_, models::Plan>(
            r#"
            INSERT INTO plans (name) VALUES ($1)
            ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name
            RETURNING *
            "#,
        )
        .bind(name)
        .fetch_one(&self.pool)
        .await?;
        Ok(plan)
    }

    pub async fn plan_of_user(&self, user_id: &str) -> anyhow::Result<Option<models::Plan>> {
        let plan = sqlx::query_as::<_, models::Plan>(
            r#"
            SELECT p.* FROM plans p
            JOIN users u ON u.plan_id = p.id
            WHERE u.id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(plan)
    }

    pub async fn get_or_create_feature(
        &self,
        key: &str,
        description: Option<&str>,
    ) -> anyhow::Result<models::Feature> {
        let feature = sqlx::query_as::<_, models::Feature>(
            r#"
            INSERT INTO features (key, description) VALUES ($1, $2)
            ON CONFLICT (key) DO UPDATE SET description = COALESCE($2, features.description)
            RETURNING *
            "#,
        )
        .bind(key)
        .bind(description)
        .fetch_one(&self.pool)
        .await?;
        Ok(feature)
    }

    pub async fn set_plan_feature(
        &self,
        plan_id: i32,
        feature_id: i32,
        value: &str,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO plan_features (plan_id, feature_id, value)
            VALUES ($1, $2, $3)
            ON CONFLICT (plan_id, feature_id) DO UPDATE SET value = EXCLUDED.value
            "#,
        )
        .bind(plan_id)
        .bind(feature_id)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Raw feature value for the user's plan. `None` when the user has no
    /// plan or the plan lacks the feature row; the caller decides defaults.
    pub async fn feature_value_for_user(
        &self,
        user_id: &str,
        key: &str,
    ) -> anyhow::Result<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as(
            r#"
            SELECT pf.value FROM plan_features pf
            JOIN features f ON f.id = pf.feature_id
            JOIN users u ON u.plan_id = pf.plan_id
            WHERE u.id = $1 AND f.key = $2
            "#,
        )
        .bind(user_id)
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| r.0))
    }

    /// Default plan tiers with their monthly message quotas. Idempotent;
    /// runs at startup.
    pub async fn seed_default_plans(&self) -> anyhow::Result<()> {
        let feature = self
            .get_or_create_feature(
                crate::plan::FEATURE_MONTHLY_MESSAGE_QUOTA,
                Some("Cota mensal de mensagens do chat"),
            )
            .await?;

        for (name, quota) in [("basico", 100), ("premium", 500), ("pro", 2000)] {
            let plan = self.get_or_create_plan(name).await?;
            self.set_plan_feature(plan.id, feature.id, &quota.to_string())
                .await?;
        }
        Ok(())
    }

    // ── Usage Ledger ───────────────────────────────────────────────

    /// Idempotent get-or-create for the (user, month) ledger row. Concurrent
    /// callers hit the unique constraint and resolve through the upsert, so
    /// the same row id comes back for everyone.
    pub async fn get_or_create_usage(
        &self,
        user_id: &str,
        month_key: &str,
    ) -> anyhow::Result<models::MonthlyUsage> {
        let usage = sqlx::query_as::<_, models::MonthlyUsage>(
            r#"
            INSERT INTO monthly_usage (user_id, month_key)
            VALUES ($1, $2)
            ON CONFLICT (user_id, month_key) DO UPDATE SET updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(month_key)
        .fetch_one(&self.pool)
        .await?;
        Ok(usage)
    }

    /// Monotonic increment; amounts <= 0 are a no-op.
    pub async fn increment_usage(&self, usage_id: i32, amount: i32) -> anyhow::Result<()> {
        if amount <= 0 {
            return Ok(());
        }
        sqlx::query(
            "UPDATE monthly_usage SET used_messages = used_messages + $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(usage_id)
        .bind(amount)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ── Chat Operations ────────────────────────────────────────────

    pub async fn create_chat(
        &self,
        user_id: &str,
        title: &str,
        supports_vision: bool,
    ) -> anyhow::Result<models::Chat> {
        let chat = sqlx::query_as::<_, models::Chat>(
            "INSERT INTO chats (user_id, title, supports_vision) VALUES ($1, $2, $3) RETURNING *",
        )
        .bind(user_id)
        .bind(title)
        .bind(supports_vision)
        .fetch_one(&self.pool)
        .await?;
        Ok(chat)
    }

    pub async fn get_chat(
        &self,
        chat_id: Uuid,
        user_id: &str,
    ) -> anyhow::Result<Option<models::Chat>> {
        let chat = sqlx::query_as::<_, models::Chat>(
            "SELECT * FROM chats WHERE id = $1 AND user_id = $2",
        )
        .bind(chat_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(chat)
    }

    /// Chats for the sidebar, optionally filtered by a search term matching
    /// the title or any message content.
    pub async fn list_chats(
        &self,
        user_id: &str,
        query: Option<&str>,
    ) -> anyhow::Result<Vec<models::Chat>> {
        let chats = match query.filter(|q| !q.trim().is_empty()) {
            Some(q) => {
                let pattern = format!("%{}%", q.trim());
                sqlx::query_as::<_, models::Chat>(
                    r#"
                    SELECT DISTINCT c.* FROM chats c
                    LEFT JOIN chat_messages m ON m.chat_id = c.id
                    WHERE c.user_id = $1 AND (c.title ILIKE $2 OR m.content ILIKE $2)
                    ORDER BY c.created_at DESC
                    "#,
                )
                .bind(user_id)
                .bind(pattern)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, models::Chat>(
                    "SELECT * FROM chats WHERE user_id = $1 ORDER BY created_at DESC",
                )
                .bind(user_id)
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(chats)
    }

    pub async fn update_chat_meta(
        &self,
        chat_id: Uuid,
        user_id: &str,
        title: Option<&str>,
        system_prompt: Option<&str>,
        default_model: Option<&str>,
    ) -> anyhow::Result<Option<models::Chat>> {
        let chat = sqlx::query_as::<_, models::Chat>(
            r#"
            UPDATE chats SET
                title = COALESCE($3, title),
                system_prompt = COALESCE($4, system_prompt),
                default_model = COALESCE($5, default_model),
                updated_at = NOW()
            WHERE id = $1 AND user_id = $2
            RETURNING *
            "#,
        )
        .bind(chat_id)
        .bind(user_id)
        .bind(title)
        .bind(system_prompt)
        .bind(default_model)
        .fetch_optional(&self.pool)
        .await?;
        Ok(chat)
    }

    pub async fn set_chat_archived(
        &self,
        chat_id: Uuid,
        user_id: &str,
        archived: bool,
    ) -> anyhow::Result<bool> {
        let result = sqlx::query("UPDATE chats SET archived = $3 WHERE id = $1 AND user_id = $2")
            .bind(chat_id)
            .bind(user_id)
            .bind(archived)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn delete_chat(&self, chat_id: Uuid, user_id: &str) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM chats WHERE id = $1 AND user_id = $2")
            .bind(chat_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // ── Message Operations ─────────────────────────────────────────

    pub async fn save_user_message(
        &self,
        chat_id: Uuid,
        content: &str,
    ) -> anyhow::Result<models::ChatMessage> {
        let msg = sqlx::query_as::<_, models::ChatMessage>(
            "INSERT INTO chat_messages (chat_id, role, content) VALUES ($1, 'user', $2) RETURNING *",
        )
        .bind(chat_id)
        .bind(content)
        .fetch_one(&self.pool)
        .await?;

        sqlx::query("UPDATE chats SET updated_at = NOW() WHERE id = $1")
            .bind(chat_id)
            .execute(&self.pool)
            .await?;

        Ok(msg)
    }

    pub async fn save_assistant_message(
        &self,
        chat_id: Uuid,
        turn: &NewAssistantMessage,
    ) -> anyhow::Result<models::ChatMessage> {
        let msg = sqlx::query_as::<_, models::ChatMessage>(
            r#"
            INSERT INTO chat_messages
                (chat_id, role, content, model_used, temperature, max_tokens,
                 prompt_tokens, completion_tokens, total_tokens)
            VALUES ($1, 'assistant', $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(chat_id)
        .bind(&turn.content)
        .bind(&turn.model_used)
        .bind(turn.temperature)
        .bind(turn.max_tokens)
        .bind(turn.prompt_tokens)
        .bind(turn.completion_tokens)
        .bind(turn.total_tokens)
        .fetch_one(&self.pool)
        .await?;

        sqlx::query("UPDATE chats SET updated_at = NOW() WHERE id = $1")
            .bind(chat_id)
            .execute(&self.pool)
            .await?;

        Ok(msg)
    }

    pub async fn get_messages(&self, chat_id: Uuid) -> anyhow::Result<Vec<models::ChatMessage>> {
        let msgs = sqlx::query_as::<_, models::ChatMessage>(
            "SELECT * FROM chat_messages WHERE chat_id = $1 ORDER BY created_at ASC",
        )
        .bind(chat_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(msgs)
    }

    pub async fn add_attachment(
        &self,
        message_id: Uuid,
        att: &NewAttachment,
    ) -> anyhow::Result<models::ChatAttachment> {
        let row = sqlx::query_as::<_, models::ChatAttachment>(
            r#"
            INSERT INTO chat_attachments (message_id, name, path, mimetype, size_bytes)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(message_id)
        .bind(&att.name)
        .bind(&att.path)
        .bind(&att.mimetype)
        .bind(att.size_bytes)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    /// All attachments of a chat, for building the provider history.
    pub async fn attachments_for_chat(
        &self,
        chat_id: Uuid,
    ) -> anyhow::Result<Vec<models::ChatAttachment>> {
        let rows = sqlx::query_as::<_, models::ChatAttachment>(
            r#"
            SELECT a.* FROM chat_attachments a
            JOIN chat_messages m ON m.id = a.message_id
            WHERE m.chat_id = $1
            ORDER BY a.created_at ASC
            "#,
        )
        .bind(chat_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Attachment download, scoped to the chat owner.
    pub async fn get_attachment_for_user(
        &self,
        attachment_id: Uuid,
        user_id: &str,
    ) -> anyhow::Result<Option<models::ChatAttachment>> {
        let row = sqlx::query_as::<_, models::ChatAttachment>(
            r#"
            SELECT a.* FROM chat_attachments a
            JOIN chat_messages m ON m.id = a.message_id
            JOIN chats c ON c.id = m.chat_id
            WHERE a.id = $1 AND c.user_id = $2
            "#,
        )
        .bind(attachment_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    // ── Generated Content ──────────────────────────────────────────

    pub async fn insert_content(
        &self,
        content: &NewGeneratedContent,
    ) -> anyhow::Result<models::GeneratedContent> {
        let row = sqlx::query_as::<_, models::GeneratedContent>(
            r#"
            INSERT INTO generated_contents
                (user_id, content_type, prompt, model_used, content_data,
                 file_path, temperature, style, ratio, duration)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *
            "#,
        )
        .bind(&content.user_id)
        .bind(&content.content_type)
        .bind(&content.prompt)
        .bind(&content.model_used)
        .bind(&content.content_data)
        .bind(&content.file_path)
        .bind(content.temperature)
        .bind(&content.style)
        .bind(&content.ratio)
        .bind(content.duration)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn get_content(
        &self,
        content_id: Uuid,
    ) -> anyhow::Result<Option<models::GeneratedContent>> {
        let row = sqlx::query_as::<_, models::GeneratedContent>(
            "SELECT * FROM generated_contents WHERE id = $1",
        )
        .bind(content_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn list_contents(
        &self,
        user_id: &str,
    ) -> anyhow::Result<Vec<models::GeneratedContent>> {
        let rows = sqlx::query_as::<_, models::GeneratedContent>(
            "SELECT * FROM generated_contents WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Contents awaiting review, oldest submission first.
    pub async fn list_contents_by_status(
        &self,
        status: ReviewStatus,
    ) -> anyhow::Result<Vec<models::GeneratedContent>> {
        let rows = sqlx::query_as::<_, models::GeneratedContent>(
            r#"
            SELECT * FROM generated_contents
            WHERE status = $1
            ORDER BY submitted_at ASC NULLS LAST, created_at ASC
            "#,
        )
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn delete_content(&self, content_id: Uuid, user_id: &str) -> anyhow::Result<bool> {
        let result =
            sqlx::query("DELETE FROM generated_contents WHERE id = $1 AND user_id = $2")
                .bind(content_id)
                .bind(user_id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Persist a review transition. Submitting clears previous review marks;
    /// approving clears rejection marks and vice versa, so each status keeps
    /// exactly one actor+timestamp pair.
    pub async fn set_review_status(
        &self,
        content_id: Uuid,
        status: ReviewStatus,
        actor_id: &str,
    ) -> anyhow::Result<models::GeneratedContent> {
        let sql = match status {
            ReviewStatus::InReview => {
                r#"
                UPDATE generated_contents SET
                    status = 'in_review',
                    submitted_at = NOW(), submitted_by = $2,
                    approved_at = NULL, approved_by = NULL,
                    rejected_at = NULL, rejected_by = NULL
                WHERE id = $1
                RETURNING *
                "#
            }
            ReviewStatus::Approved => {
                r#"
                UPDATE generated_contents SET
                    status = 'approved',
                    approved_at = NOW(), approved_by = $2,
                    rejected_at = NULL, rejected_by = NULL
                WHERE id = $1
                RETURNING *
                "#
            }
            ReviewStatus::Rejected => {
                r#"
                UPDATE generated_contents SET
                    status = 'rejected',
                    rejected_at = NOW(), rejected_by = $2,
                    approved_at = NULL, approved_by = NULL
                WHERE id = $1
                RETURNING *
                "#
            }
            ReviewStatus::Draft => anyhow::bail!("content cannot return to draft"),
        };

        let row = sqlx::query_as::<_, models::GeneratedContent>(sql)
            .bind(content_id)
            .bind(actor_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(row)
    }

    // ── Projects ───────────────────────────────────────────────────

    pub async fn create_project(
        &self,
        user_id: &str,
        name: &str,
    ) -> anyhow::Result<models::Project> {
        let row = sqlx::query_as::<_, models::Project>(
            "INSERT INTO projects (user_id, name) VALUES ($1, $2) RETURNING *",
        )
        .bind(user_id)
        .bind(name)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn link_content_to_project(
        &self,
        content_id: Uuid,
        project_id: Uuid,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO project_contents (project_id, content_id)
            VALUES ($1, $2)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(project_id)
        .bind(content_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn project_ids_for_content(&self, content_id: Uuid) -> anyhow::Result<Vec<Uuid>> {
        let rows: Vec<(Uuid,)> =
            sqlx::query_as("SELECT project_id FROM project_contents WHERE content_id = $1")
                .bind(content_id)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(|r| r.0).collect())
    }
}
