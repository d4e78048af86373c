use std::path::Path;
use std::str::FromStr;

use sqlx::sqlite::{Sqlite, SqliteConnectOptions, SqlitePoolOptions};
use sqlx::pool::Pool;
use tokio::sync::{mpsc, oneshot};

use crate::error::{AppError, AppResult};
use crate::grading::selector::{PriorSubmissions, VersionSelector};
use crate::structs::models::{
    BestSubmission, NewQuestion, NewSubmission, NewUser, Question, Role, Submission, User,
};
use crate::structs::types::{QuestionId, SqlFile, SubmissionId, UserId};
use crate::utils::now_unix;

const SCHEMA: [&str; 4] = [
    "CREATE TABLE IF NOT EXISTS users (
        id            INTEGER PRIMARY KEY AUTOINCREMENT,
        username      TEXT NOT NULL UNIQUE,
        email         TEXT NOT NULL,
        password_hash TEXT NOT NULL,
        role          TEXT NOT NULL,
        class_name    TEXT,
        teacher_code  TEXT,
        student_code  TEXT,
        created_at    INTEGER NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS questions (
        id                INTEGER PRIMARY KEY AUTOINCREMENT,
        title             TEXT NOT NULL,
        question_text     TEXT NOT NULL,
        max_marks         INTEGER NOT NULL CHECK (max_marks > 0),
        deadline          INTEGER NOT NULL,
        requires_examples INTEGER NOT NULL DEFAULT 0,
        requires_diagrams INTEGER NOT NULL DEFAULT 0,
        created_at        INTEGER NOT NULL,
        teacher_id        INTEGER NOT NULL REFERENCES users(id)
    )",
    "CREATE TABLE IF NOT EXISTS submissions (
        id                    INTEGER PRIMARY KEY AUTOINCREMENT,
        answer                TEXT NOT NULL,
        question_id           INTEGER NOT NULL REFERENCES questions(id) ON DELETE CASCADE,
        student_id            INTEGER NOT NULL REFERENCES users(id),
        version               INTEGER NOT NULL,
        introduction_marks    REAL NOT NULL,
        main_body_marks       REAL NOT NULL,
        conclusion_marks      REAL NOT NULL,
        examples_marks        REAL NOT NULL,
        diagrams_marks        REAL NOT NULL,
        total_marks           REAL NOT NULL,
        introduction_feedback TEXT NOT NULL,
        main_body_feedback    TEXT NOT NULL,
        conclusion_feedback   TEXT NOT NULL,
        examples_feedback     TEXT NOT NULL,
        diagrams_feedback     TEXT NOT NULL,
        ai_detection_score    REAL NOT NULL DEFAULT 0,
        is_best_submission    INTEGER NOT NULL DEFAULT 0,
        submitted_at          INTEGER NOT NULL,
        UNIQUE (student_id, question_id, version)
    )",
    // 每个学生每道题最多一个最佳版本
    "CREATE UNIQUE INDEX IF NOT EXISTS one_best_submission
        ON submissions (student_id, question_id) WHERE is_best_submission = 1",
];

const USER_COLUMNS: &str =
    "id, username, email, password_hash, role, class_name, teacher_code, student_code";

const QUESTION_COLUMNS: &str = "q.id, q.title, q.question_text, q.max_marks, q.deadline, \
    q.requires_examples, q.requires_diagrams, q.created_at, q.teacher_id";

const SUBMISSION_COLUMNS: &str = "s.id, s.answer, s.question_id, s.student_id, s.version, \
    s.introduction_marks, s.main_body_marks, s.conclusion_marks, s.examples_marks, s.diagrams_marks, \
    s.total_marks, s.introduction_feedback, s.main_body_feedback, s.conclusion_feedback, \
    s.examples_feedback, s.diagrams_feedback, s.ai_detection_score, s.is_best_submission, s.submitted_at";

#[derive(Debug)]
enum Command {
    CreateUser {
        user: NewUser,
        res_tx: oneshot::Sender<AppResult<User>>,
    },
    FindLoginUser {
        role: Role,
        code: String,
        res_tx: oneshot::Sender<AppResult<Option<User>>>,
    },
    GetUser {
        id: UserId,
        res_tx: oneshot::Sender<AppResult<User>>,
    },
    CreateQuestion {
        question: NewQuestion,
        res_tx: oneshot::Sender<AppResult<Question>>,
    },
    GetQuestion {
        id: QuestionId,
        res_tx: oneshot::Sender<AppResult<Question>>,
    },
    ListTeacherQuestions {
        teacher_id: UserId,
        res_tx: oneshot::Sender<AppResult<Vec<Question>>>,
    },
    ListOpenQuestions {
        class_name: Option<String>,
        now: i64,
        res_tx: oneshot::Sender<AppResult<Vec<Question>>>,
    },
    DeleteQuestion {
        id: QuestionId,
        res_tx: oneshot::Sender<AppResult<u64>>,
    },
    RecordSubmission {
        submission: NewSubmission,
        res_tx: oneshot::Sender<AppResult<Submission>>,
    },
    GetSubmission {
        id: SubmissionId,
        res_tx: oneshot::Sender<AppResult<Submission>>,
    },
    ListStudentSubmissions {
        student_id: UserId,
        question_id: QuestionId,
        res_tx: oneshot::Sender<AppResult<Vec<Submission>>>,
    },
    ListBestSubmissions {
        question_id: QuestionId,
        res_tx: oneshot::Sender<AppResult<Vec<BestSubmission>>>,
    },
}

pub struct SqlServer {
    // sql连接池
    pool: Pool<Sqlite>,

    /// 接收命令的管道
    cmd_rx: mpsc::UnboundedReceiver<Command>,
}

/// 命令执行层
impl SqlServer {
    pub async fn new(sql_file: SqlFile, max_connections: u32) -> AppResult<(SqlServer, SqlServerHandle)> {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let in_memory = sql_file == ":memory:";
        // 检测数据库文件是否存在，不存在则新建
        if !in_memory && !Path::new(sql_file.as_str()).exists() {
            log::info!("数据库文件不存在，创建数据库文件: {}", sql_file);
            let file = std::fs::File::create(sql_file.as_str()).map_err(|e| {
                log::error!("创建数据库文件失败: {:?}", e);
                e
            })?;
            file.sync_all()?;
        }
        let url = if in_memory {
            "sqlite::memory:".to_string()
        } else {
            format!("sqlite://{}", sql_file)
        };
        let options = SqliteConnectOptions::from_str(&url)?.foreign_keys(true);
        // 内存数据库每个连接都是独立的库，只能使用一个连接
        let max_connections = if in_memory { 1 } else { max_connections.max(1) };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| {
                log::error!("创建SQL连接池失败: {:?}", e);
                e
            })?;

        // 执行创建表的 SQL 语句
        for statement in SCHEMA {
            sqlx::query(statement).execute(&pool).await.map_err(|e| {
                log::error!("执行创建表命令失败: {:?}", e);
                e
            })?;
        }

        Ok((SqlServer { pool, cmd_rx }, SqlServerHandle { cmd_tx }))
    }

    /// 注册新用户，用户名和同角色的登录码不能重复
    async fn create_user(&mut self, user: NewUser) -> AppResult<User> {
        let taken: Option<i64> = sqlx::query_scalar("SELECT id FROM users WHERE username = ?")
            .bind(&user.username)
            .fetch_optional(&self.pool)
            .await?;
        if taken.is_some() {
            return Err(AppError::BadRequest("Username already exists. Please choose another.".to_string()));
        }
        if self.find_login_user(user.role, &user.login_code).await?.is_some() {
            return Err(AppError::BadRequest("This login code is already in use.".to_string()));
        }

        let (teacher_code, student_code) = match user.role {
            Role::Teacher => (Some(user.login_code), None),
            Role::Student => (None, Some(user.login_code)),
        };
        let id = sqlx::query(
            "INSERT INTO users (username, email, password_hash, role, class_name, teacher_code, student_code, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.role)
        .bind(&user.class_name)
        .bind(teacher_code)
        .bind(student_code)
        .bind(now_unix())
        .execute(&self.pool)
        .await?
        .last_insert_rowid();
        log::info!("新用户{}注册成功，id为{}", user.username, id);
        self.get_user(id).await
    }

    async fn find_login_user(&mut self, role: Role, code: &str) -> AppResult<Option<User>> {
        let column = match role {
            Role::Teacher => "teacher_code",
            Role::Student => "student_code",
        };
        let sql = format!("SELECT {} FROM users WHERE role = ? AND {} = ? ORDER BY id LIMIT 1", USER_COLUMNS, column);
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(role)
            .bind(code)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn get_user(&mut self, id: UserId) -> AppResult<User> {
        let sql = format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS);
        sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound("User".to_string()))
    }

    async fn create_question(&mut self, question: NewQuestion) -> AppResult<Question> {
        let id = sqlx::query(
            "INSERT INTO questions (title, question_text, max_marks, deadline, requires_examples, requires_diagrams, created_at, teacher_id)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&question.title)
        .bind(&question.question_text)
        .bind(question.max_marks)
        .bind(question.deadline)
        .bind(question.requires_examples)
        .bind(question.requires_diagrams)
        .bind(now_unix())
        .bind(question.teacher_id)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();
        self.get_question(id).await
    }

    async fn get_question(&mut self, id: QuestionId) -> AppResult<Question> {
        let sql = format!("SELECT {} FROM questions q WHERE q.id = ?", QUESTION_COLUMNS);
        sqlx::query_as::<_, Question>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound("Question".to_string()))
    }

    async fn list_teacher_questions(&mut self, teacher_id: UserId) -> AppResult<Vec<Question>> {
        let sql = format!(
            "SELECT {} FROM questions q WHERE q.teacher_id = ? ORDER BY q.created_at DESC, q.id DESC",
            QUESTION_COLUMNS
        );
        Ok(sqlx::query_as::<_, Question>(&sql).bind(teacher_id).fetch_all(&self.pool).await?)
    }

    /// 学生可见的未截止问题，没有班级的学生可以看到所有教师的问题
    async fn list_open_questions(&mut self, class_name: Option<String>, now: i64) -> AppResult<Vec<Question>> {
        let questions = match class_name {
            Some(class_name) => {
                let sql = format!(
                    "SELECT {} FROM questions q JOIN users u ON u.id = q.teacher_id
                     WHERE q.deadline > ? AND u.role = 'teacher' AND u.class_name = ?
                     ORDER BY q.deadline",
                    QUESTION_COLUMNS
                );
                sqlx::query_as::<_, Question>(&sql)
                    .bind(now)
                    .bind(class_name)
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                let sql = format!(
                    "SELECT {} FROM questions q JOIN users u ON u.id = q.teacher_id
                     WHERE q.deadline > ? AND u.role = 'teacher'
                     ORDER BY q.deadline",
                    QUESTION_COLUMNS
                );
                sqlx::query_as::<_, Question>(&sql).bind(now).fetch_all(&self.pool).await?
            }
        };
        Ok(questions)
    }

    /// 删除问题以及所有相关提交，返回删除的提交数量
    async fn delete_question(&mut self, id: QuestionId) -> AppResult<u64> {
        let mut tx = self.pool.begin().await?;
        let removed = sqlx::query("DELETE FROM submissions WHERE question_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        let deleted = sqlx::query("DELETE FROM questions WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if deleted == 0 {
            return Err(AppError::NotFound("Question".to_string()));
        }
        tx.commit().await?;
        log::info!("问题{}已删除，同时删除了{}条提交记录", id, removed);
        Ok(removed)
    }

    /// 在同一个事务中决定版本号、更新最佳标记并写入新提交
    async fn record_submission(&mut self, submission: NewSubmission) -> AppResult<Submission> {
        let mut tx = self.pool.begin().await?;

        let latest_version: Option<i64> =
            sqlx::query_scalar("SELECT MAX(version) FROM submissions WHERE student_id = ? AND question_id = ?")
                .bind(submission.student_id)
                .bind(submission.question_id)
                .fetch_one(&mut *tx)
                .await?;
        let best_total: Option<f64> = sqlx::query_scalar(
            "SELECT total_marks FROM submissions
             WHERE student_id = ? AND question_id = ? AND is_best_submission = 1
             ORDER BY version DESC LIMIT 1",
        )
        .bind(submission.student_id)
        .bind(submission.question_id)
        .fetch_optional(&mut *tx)
        .await?;

        let prior = latest_version.map(|latest_version| PriorSubmissions {
            latest_version,
            best_total,
        });
        let result = &submission.result;
        let decision = VersionSelector::decide(prior.as_ref(), result.total_marks);

        if decision.clear_previous_best {
            sqlx::query(
                "UPDATE submissions SET is_best_submission = 0
                 WHERE student_id = ? AND question_id = ? AND is_best_submission = 1",
            )
            .bind(submission.student_id)
            .bind(submission.question_id)
            .execute(&mut *tx)
            .await?;
        }

        let id = sqlx::query(
            "INSERT INTO submissions (
                answer, question_id, student_id, version,
                introduction_marks, main_body_marks, conclusion_marks, examples_marks, diagrams_marks, total_marks,
                introduction_feedback, main_body_feedback, conclusion_feedback, examples_feedback, diagrams_feedback,
                ai_detection_score, is_best_submission, submitted_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&submission.answer)
        .bind(submission.question_id)
        .bind(submission.student_id)
        .bind(decision.version)
        .bind(result.introduction.marks)
        .bind(result.main_body.marks)
        .bind(result.conclusion.marks)
        .bind(result.examples.marks)
        .bind(result.diagrams.marks)
        .bind(result.total_marks)
        .bind(&result.introduction.feedback)
        .bind(&result.main_body.feedback)
        .bind(&result.conclusion.feedback)
        .bind(&result.examples.feedback)
        .bind(&result.diagrams.feedback)
        .bind(result.ai_detection_score)
        .bind(decision.is_best)
        .bind(now_unix())
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        tx.commit().await?;
        if decision.is_best {
            log::info!("学生{}的第{}版提交成为最佳版本", submission.student_id, decision.version);
        } else {
            log::info!("学生{}的第{}版提交未超过最佳版本", submission.student_id, decision.version);
        }
        self.get_submission(id).await
    }

    async fn get_submission(&mut self, id: SubmissionId) -> AppResult<Submission> {
        let sql = format!("SELECT {} FROM submissions s WHERE s.id = ?", SUBMISSION_COLUMNS);
        sqlx::query_as::<_, Submission>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound("Submission".to_string()))
    }

    /// 按版本从新到旧排列
    async fn list_student_submissions(&mut self, student_id: UserId, question_id: QuestionId) -> AppResult<Vec<Submission>> {
        let sql = format!(
            "SELECT {} FROM submissions s WHERE s.student_id = ? AND s.question_id = ? ORDER BY s.version DESC",
            SUBMISSION_COLUMNS
        );
        Ok(sqlx::query_as::<_, Submission>(&sql)
            .bind(student_id)
            .bind(question_id)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn list_best_submissions(&mut self, question_id: QuestionId) -> AppResult<Vec<BestSubmission>> {
        let sql = format!(
            "SELECT {}, u.username FROM submissions s JOIN users u ON u.id = s.student_id
             WHERE s.question_id = ? AND s.is_best_submission = 1
             ORDER BY s.total_marks DESC, s.id",
            SUBMISSION_COLUMNS
        );
        Ok(sqlx::query_as::<_, BestSubmission>(&sql)
            .bind(question_id)
            .fetch_all(&self.pool)
            .await?)
    }

    pub async fn run(mut self) {
        while let Some(cmd) = self.cmd_rx.recv().await {
            match cmd {
                Command::CreateUser { user, res_tx } => {
                    let _ = res_tx.send(self.create_user(user).await);
                }
                Command::FindLoginUser { role, code, res_tx } => {
                    let _ = res_tx.send(self.find_login_user(role, &code).await);
                }
                Command::GetUser { id, res_tx } => {
                    let _ = res_tx.send(self.get_user(id).await);
                }
                Command::CreateQuestion { question, res_tx } => {
                    let _ = res_tx.send(self.create_question(question).await);
                }
                Command::GetQuestion { id, res_tx } => {
                    let _ = res_tx.send(self.get_question(id).await);
                }
                Command::ListTeacherQuestions { teacher_id, res_tx } => {
                    let _ = res_tx.send(self.list_teacher_questions(teacher_id).await);
                }
                Command::ListOpenQuestions { class_name, now, res_tx } => {
                    let _ = res_tx.send(self.list_open_questions(class_name, now).await);
                }
                Command::DeleteQuestion { id, res_tx } => {
                    let _ = res_tx.send(self.delete_question(id).await);
                }
                Command::RecordSubmission { submission, res_tx } => {
                    let result = self.record_submission(submission).await;
                    if let Err(e) = &result {
                        log::error!("保存提交记录时出错: {:?}", e);
                    }
                    let _ = res_tx.send(result);
                }
                Command::GetSubmission { id, res_tx } => {
                    let _ = res_tx.send(self.get_submission(id).await);
                }
                Command::ListStudentSubmissions { student_id, question_id, res_tx } => {
                    let _ = res_tx.send(self.list_student_submissions(student_id, question_id).await);
                }
                Command::ListBestSubmissions { question_id, res_tx } => {
                    let _ = res_tx.send(self.list_best_submissions(question_id).await);
                }
            }
        }
        log::info!("SQL服务已停止");
    }
}

/// handler层
#[derive(Debug, Clone)]
pub struct SqlServerHandle {
    cmd_tx: mpsc::UnboundedSender<Command>,
}

impl SqlServerHandle {
    async fn request<T>(&self, command: impl FnOnce(oneshot::Sender<AppResult<T>>) -> Command) -> AppResult<T> {
        let (res_tx, res_rx) = oneshot::channel();
        self.cmd_tx.send(command(res_tx)).map_err(|_| AppError::ConnectionClosed)?;
        res_rx.await.map_err(|_| AppError::ConnectionClosed)?
    }

    pub async fn create_user(&self, user: NewUser) -> AppResult<User> {
        self.request(|res_tx| Command::CreateUser { user, res_tx }).await
    }

    /// 按角色和登录码查找用户
    pub async fn find_login_user(&self, role: Role, code: String) -> AppResult<Option<User>> {
        self.request(|res_tx| Command::FindLoginUser { role, code, res_tx }).await
    }

    pub async fn get_user(&self, id: UserId) -> AppResult<User> {
        self.request(|res_tx| Command::GetUser { id, res_tx }).await
    }

    pub async fn create_question(&self, question: NewQuestion) -> AppResult<Question> {
        self.request(|res_tx| Command::CreateQuestion { question, res_tx }).await
    }

    pub async fn get_question(&self, id: QuestionId) -> AppResult<Question> {
        self.request(|res_tx| Command::GetQuestion { id, res_tx }).await
    }

    pub async fn list_teacher_questions(&self, teacher_id: UserId) -> AppResult<Vec<Question>> {
        self.request(|res_tx| Command::ListTeacherQuestions { teacher_id, res_tx }).await
    }

    pub async fn list_open_questions(&self, class_name: Option<String>, now: i64) -> AppResult<Vec<Question>> {
        self.request(|res_tx| Command::ListOpenQuestions { class_name, now, res_tx }).await
    }

    pub async fn delete_question(&self, id: QuestionId) -> AppResult<u64> {
        self.request(|res_tx| Command::DeleteQuestion { id, res_tx }).await
    }

    /// 保存评分后的提交，版本号和最佳标记在事务中确定
    pub async fn record_submission(&self, submission: NewSubmission) -> AppResult<Submission> {
        self.request(|res_tx| Command::RecordSubmission { submission, res_tx }).await
    }

    pub async fn get_submission(&self, id: SubmissionId) -> AppResult<Submission> {
        self.request(|res_tx| Command::GetSubmission { id, res_tx }).await
    }

    pub async fn list_student_submissions(&self, student_id: UserId, question_id: QuestionId) -> AppResult<Vec<Submission>> {
        self.request(|res_tx| Command::ListStudentSubmissions { student_id, question_id, res_tx }).await
    }

    pub async fn list_best_submissions(&self, question_id: QuestionId) -> AppResult<Vec<BestSubmission>> {
        self.request(|res_tx| Command::ListBestSubmissions { question_id, res_tx }).await
    }
}
