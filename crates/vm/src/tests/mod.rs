// 单元测试的宿主环境
//
// sync 只在自身的测试构建中回退到 Mock，vm 的单元测试需要自行注册。

#[path = "../../tests/common/collab.rs"]
mod collab;

pub(crate) use collab::init;
