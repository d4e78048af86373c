// 用户ID
pub type UserId = i64;
// 问题ID
pub type QuestionId = i64;
// 提交记录ID
pub type SubmissionId = i64;
// 登录后发放的会话令牌
pub type SessionToken = String;
// 准备连接的db文件
pub type SqlFile = String;
