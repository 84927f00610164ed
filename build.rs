use vergen::EmitBuilder;

fn main() {
    // 生成构建信息（时间戳、git 提交），用于 --version 输出
    EmitBuilder::builder()
        .build_timestamp()
        .git_sha(true)
        .emit()
        .expect("Failed to generate build information");
}
