use std::collections::HashMap;

pub struct I18n {
    translations: HashMap<String, HashMap<String, String>>,
    current_lang: String,
}

impl I18n {
    pub fn new(lang: &str) -> Self {
        let mut translations = HashMap::new();

        // English
        let mut en = HashMap::new();
        en.insert("help_about".to_string(), "Track command executions, gate run-once commands, scaffold managed commands".to_string());

        // Managed command status lines
        en.insert("skip_run_once".to_string(), "Skipped {0}: already executed successfully (run_once)".to_string());
        en.insert("dry_run_notice".to_string(), "DRY RUN - all changes will be rolled back".to_string());
        en.insert("command_succeeded".to_string(), "Command {0} completed successfully in {1}s".to_string());
        en.insert("dry_run_suffix".to_string(), " (dry run - changes rolled back)".to_string());
        en.insert("command_failed".to_string(), "Command {0} failed: {1}".to_string());

        // Scaffolding
        en.insert("scaffold_created".to_string(), "Successfully created managed command!".to_string());
        en.insert("scaffold_command_path".to_string(), "  Command: {0}".to_string());
        en.insert("scaffold_test_path".to_string(), "  Test:    {0}".to_string());
        en.insert("scaffold_next_steps".to_string(), "Next steps:".to_string());
        en.insert("scaffold_step_edit".to_string(), "  1. Edit {0} to add your command logic".to_string());
        en.insert("scaffold_step_tests".to_string(), "  2. Update {0} with specific test cases".to_string());
        en.insert("scaffold_step_register".to_string(), "  3. Make sure `pub mod management;` is declared in your crate root".to_string());

        // Listing
        en.insert("no_records".to_string(), "No records found".to_string());
        en.insert("history_records".to_string(), "History for {0}:".to_string());
        en.insert("listing_count".to_string(), "({0} records)".to_string());
        en.insert("record_not_found".to_string(), "No record with id {0}".to_string());
        en.insert("col_id".to_string(), "ID".to_string());
        en.insert("col_name".to_string(), "Command".to_string());
        en.insert("col_executed_at".to_string(), "Executed at".to_string());
        en.insert("col_status".to_string(), "Status".to_string());
        en.insert("col_duration".to_string(), "Duration".to_string());
        en.insert("status_success".to_string(), "Success".to_string());
        en.insert("status_failed".to_string(), "Failed".to_string());
        en.insert("detail_parameters".to_string(), "Parameters".to_string());
        en.insert("detail_output".to_string(), "Output".to_string());
        en.insert("detail_error".to_string(), "Error".to_string());
        en.insert("detail_run_once".to_string(), "Run once".to_string());
        en.insert("should_run_yes".to_string(), "{0} will run".to_string());
        en.insert("should_run_no".to_string(), "{0} will be skipped (run_once already succeeded)".to_string());

        // Errors
        en.insert("error_create_home_dir".to_string(), "Failed to create data directory".to_string());
        en.insert("error_read_ledger".to_string(), "Failed to read the execution ledger".to_string());
        en.insert("error_execute_command".to_string(), "Failed to execute command".to_string());
        en.insert("error_read_stdout".to_string(), "Unable to read standard output".to_string());
        en.insert("error_read_stderr".to_string(), "Unable to read error output".to_string());
        en.insert("error_parse_option".to_string(), "Invalid option '{0}', expected key=value".to_string());
        en.insert("error_scaffold".to_string(), "Failed to generate managed command".to_string());

        // Chinese
        let mut zh = HashMap::new();
        zh.insert("help_about".to_string(), "记录命令执行、限制一次性命令、生成托管命令".to_string());

        zh.insert("skip_run_once".to_string(), "Skipped {0}: 已成功执行过，跳过 (run_once)".to_string());
        zh.insert("dry_run_notice".to_string(), "试运行 - 所有更改都将回滚".to_string());
        zh.insert("command_succeeded".to_string(), "命令 {0} 执行成功，耗时 {1}s".to_string());
        zh.insert("dry_run_suffix".to_string(), " (试运行 - 更改已回滚)".to_string());
        zh.insert("command_failed".to_string(), "命令 {0} 执行失败: {1}".to_string());

        zh.insert("scaffold_created".to_string(), "托管命令创建成功！".to_string());
        zh.insert("scaffold_command_path".to_string(), "  命令: {0}".to_string());
        zh.insert("scaffold_test_path".to_string(), "  测试: {0}".to_string());
        zh.insert("scaffold_next_steps".to_string(), "后续步骤:".to_string());
        zh.insert("scaffold_step_edit".to_string(), "  1. 编辑 {0} 添加命令逻辑".to_string());
        zh.insert("scaffold_step_tests".to_string(), "  2. 在 {0} 中补充测试用例".to_string());
        zh.insert("scaffold_step_register".to_string(), "  3. 确认 crate 根模块中声明了 `pub mod management;`".to_string());

        zh.insert("no_records".to_string(), "没有找到记录".to_string());
        zh.insert("history_records".to_string(), "{0} 的执行历史:".to_string());
        zh.insert("listing_count".to_string(), "(共 {0} 条记录)".to_string());
        zh.insert("record_not_found".to_string(), "没有 id 为 {0} 的记录".to_string());
        zh.insert("col_id".to_string(), "ID".to_string());
        zh.insert("col_name".to_string(), "命令".to_string());
        zh.insert("col_executed_at".to_string(), "执行时间".to_string());
        zh.insert("col_status".to_string(), "状态".to_string());
        zh.insert("col_duration".to_string(), "耗时".to_string());
        zh.insert("status_success".to_string(), "成功".to_string());
        zh.insert("status_failed".to_string(), "失败".to_string());
        zh.insert("detail_parameters".to_string(), "参数".to_string());
        zh.insert("detail_output".to_string(), "输出".to_string());
        zh.insert("detail_error".to_string(), "错误".to_string());
        zh.insert("detail_run_once".to_string(), "仅运行一次".to_string());
        zh.insert("should_run_yes".to_string(), "{0} 将会执行".to_string());
        zh.insert("should_run_no".to_string(), "{0} 将被跳过 (run_once 已成功)".to_string());

        zh.insert("error_create_home_dir".to_string(), "创建数据目录失败".to_string());
        zh.insert("error_read_ledger".to_string(), "读取执行记录失败".to_string());
        zh.insert("error_execute_command".to_string(), "执行命令失败".to_string());
        zh.insert("error_read_stdout".to_string(), "无法读取标准输出".to_string());
        zh.insert("error_read_stderr".to_string(), "无法读取错误输出".to_string());
        zh.insert("error_parse_option".to_string(), "无效的选项 '{0}'，应为 key=value".to_string());
        zh.insert("error_scaffold".to_string(), "生成托管命令失败".to_string());

        translations.insert("en".to_string(), en);
        translations.insert("zh".to_string(), zh);

        let effective_lang = if lang.starts_with("zh") || lang == "cn" || lang == "chinese" {
            "zh"
        } else {
            "en"
        };

        Self {
            translations,
            current_lang: effective_lang.to_string(),
        }
    }

    pub fn t(&self, key: &str) -> String {
        if let Some(lang_map) = self.translations.get(&self.current_lang) {
            if let Some(value) = lang_map.get(key) {
                return value.clone();
            }
        }
        key.to_string()
    }

    pub fn t_format(&self, key: &str, args: &[&str]) -> String {
        let template = self.t(key);
        let mut result = template;
        for (i, arg) in args.iter().enumerate() {
            result = result.replace(&format!("{{{}}}", i), arg);
        }
        result
    }
}

impl Default for I18n {
    fn default() -> Self {
        Self::new("en")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_selection() {
        assert_eq!(I18n::new("zh_CN").t("status_failed"), "失败");
        assert_eq!(I18n::new("en_US").t("status_failed"), "Failed");
        assert_eq!(I18n::new("fr_FR").t("status_failed"), "Failed");
    }

    #[test]
    fn test_t_format_substitutes_positional_args() {
        let i18n = I18n::default();
        assert_eq!(
            i18n.t_format("command_succeeded", &["jobs.cleanup", "0.25"]),
            "Command jobs.cleanup completed successfully in 0.25s"
        );
    }

    #[test]
    fn test_unknown_key_falls_back_to_key() {
        assert_eq!(I18n::default().t("missing_key"), "missing_key");
    }

    #[test]
    fn test_both_languages_have_same_keys() {
        let i18n = I18n::default();
        let en = &i18n.translations["en"];
        let zh = &i18n.translations["zh"];
        for key in en.keys() {
            assert!(zh.contains_key(key), "missing zh translation for {}", key);
        }
        assert_eq!(en.len(), zh.len());
    }
}
